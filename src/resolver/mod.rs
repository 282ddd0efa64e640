mod classic;
mod doh;
mod group;

pub use classic::ClassicResolver;
pub use doh::DohResolver;
pub use group::GroupResolver;

use crate::error::{AppError, ConfigError};
use async_trait::async_trait;
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

// 下游解析器。实现持有自己的套接字或 HTTP 客户端，
// 生命周期与实例一致
#[async_trait]
pub trait DnsResolver: Send + Sync {
    fn name(&self) -> &str;
    async fn query(&self, req: &Message) -> Result<Message, AppError>;
}

// 从 URI 解析出的传输参数，来自 query string
#[derive(Debug, Clone, Default)]
pub struct TransportParams {
    // 单次交换超时（毫秒）
    pub timeout_ms: Option<u64>,
}

fn invalid_uri(uri: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidUpstreamUri {
        uri: uri.to_string(),
        reason: reason.into(),
    }
}

// 解析 query string 中的传输参数，未知键忽略。
// timeout 接受纯毫秒数或带 ms/s 后缀的写法
fn parse_params(uri: &str, url: &Url) -> Result<TransportParams, ConfigError> {
    let mut params = TransportParams::default();
    for (key, value) in url.query_pairs() {
        if key.eq_ignore_ascii_case("timeout") {
            params.timeout_ms = Some(parse_timeout(uri, &value)?);
        }
    }
    Ok(params)
}

fn parse_timeout(uri: &str, raw: &str) -> Result<u64, ConfigError> {
    let raw = raw.trim();
    let (digits, scale) = if let Some(rest) = raw.strip_suffix("ms") {
        (rest, 1)
    } else if let Some(rest) = raw.strip_suffix('s') {
        (rest, 1000)
    } else {
        (raw, 1)
    };
    digits
        .trim()
        .parse::<u64>()
        .map(|v| v * scale)
        .map_err(|_| invalid_uri(uri, format!("invalid timeout value '{}'", raw)))
}

// 按 URI 方案构造解析器。支持 udp://、tcp://、dot:// 与 https://
pub fn make_resolver(uri: &str) -> Result<Arc<dyn DnsResolver>, ConfigError> {
    let url = Url::parse(uri.trim()).map_err(|e| invalid_uri(uri, e.to_string()))?;
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url
        .host_str()
        .ok_or_else(|| invalid_uri(uri, "missing host"))?
        .to_string();
    let params = parse_params(uri, &url)?;

    match scheme.as_str() {
        "udp" | "tcp" | "dot" => Ok(Arc::new(ClassicResolver::new(
            &scheme,
            &host,
            url.port(),
            &params,
        )?)),
        "https" => {
            let path = url.path();
            let path = if path.is_empty() { "/" } else { path };
            let endpoint = match url.port() {
                Some(port) => format!("https://{}:{}{}", host, port, path),
                None => format!("https://{}{}", host, path),
            };
            Ok(Arc::new(DohResolver::new(&endpoint, &host, &params)?))
        }
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

// 批量构造解析器，任一失败即整体失败
pub fn make_resolvers(uris: &[String]) -> Result<Vec<Arc<dyn DnsResolver>>, ConfigError> {
    let mut out = Vec::with_capacity(uris.len());
    for uri in uris {
        out.push(make_resolver(uri)?);
    }
    Ok(out)
}

pub(crate) fn timeout_of(params: &TransportParams, default_ms: u64) -> Duration {
    Duration::from_millis(params.timeout_ms.unwrap_or(default_ms))
}
