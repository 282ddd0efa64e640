use crate::error::AppError;
use crate::r#const::shutdown_timeout;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

// 可编程的 DNS 转发服务
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fluxdns",
    author,
    version,
    about = "A programmable rule-driven DNS forwarder\n\n\
             Key Features:\n\
             - Rule Engine: boolean match expressions (and/or/not) over named matchers\n\
             - Matchers: domain (suffix/full/keyword/regexp), qtype, qclass, geosite datasets\n\
             - Actions: forward to upstream groups, static host records, fixed rcode\n\
             - Upstreams: UDP, TCP, DNS-over-TLS and DNS-over-HTTPS with concurrent racing\n\
             - Caching: TTL-honoring LRU, optional stale-serving with background refresh,\n\
               optional crash-safe persistence across restarts"
)]
pub struct Args {
    // 配置文件路径
    #[arg(short, long, help = "Path to the configuration file (JSON or YAML)")]
    pub config: PathBuf,

    // 测试配置
    #[arg(
        short = 't',
        long = "test",
        action = ArgAction::SetTrue,
        help = "Test configuration file for validity and exit"
    )]
    pub test_config: bool,

    // 启用调试日志
    #[arg(
        short = 'd',
        long = "debug",
        action = ArgAction::SetTrue,
        help = "Enable debug level logging for detailed output"
    )]
    pub debug: bool,

    // 关闭超时
    #[arg(
        long = "shutdown-timeout",
        help = "Maximum time in seconds to wait for complete shutdown",
        default_value_t = shutdown_timeout::DEFAULT
    )]
    pub shutdown_timeout: u64,
}

impl Args {
    // 解析命令行参数
    pub fn parse_args() -> Self {
        Args::parse()
    }

    // 验证参数
    pub fn validation(&self) -> Result<(), AppError> {
        if self.shutdown_timeout < shutdown_timeout::MIN
            || self.shutdown_timeout > shutdown_timeout::MAX
        {
            return Err(AppError::Internal(format!(
                "shutdown timeout must be within [{}, {}] seconds",
                shutdown_timeout::MIN,
                shutdown_timeout::MAX
            )));
        }
        Ok(())
    }
}
