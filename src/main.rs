use fluxdns::{
    cache::CacheManager,
    config::LogConfig,
    engine::{build_action_map, build_matcher_map, build_rule_engine},
    server::DnsServer,
    AppError, Args, Config, RequestHandler,
};
use mimalloc::MiMalloc;
use std::process;
use std::sync::Arc;
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemBuilder, Toplevel};
use tracing::{error, info};

// 使用 mimalloc 分配器提高内存效率
#[global_allocator]
static GLOBAL: MiMalloc = mimalloc::MiMalloc;

fn init_logging(cfg: &LogConfig, debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        match cfg.level.to_ascii_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" | "warning" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_max_level(level);

    // 指定日志文件时输出到文件，否则输出到控制台
    if !cfg.file.trim().is_empty() {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(cfg.file.trim())
        {
            Ok(file) => {
                builder.with_writer(Arc::new(file)).init();
                return;
            }
            Err(e) => {
                eprintln!("failed to open log file {}: {}, falling back to console", cfg.file, e);
            }
        }
    }
    builder.init();
}

// 程序入口
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 解析命令行参数
    let args = Args::parse_args();

    // 加载配置。日志尚未初始化，失败直接打到 stderr
    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration file: {}", e);
            process::exit(1);
        }
    };

    // 初始化日志
    init_logging(&config.log, args.debug);

    // 验证参数
    if let Err(e) = args.validation() {
        error!("invalid command line arguments: {}", e);
        process::exit(1);
    }

    info!("starting fluxdns rule-driven dns forwarder");

    // 如果是测试模式，成功验证配置后退出
    if args.test_config {
        info!("configuration file validation successful");
        return Ok(());
    }

    // 创建应用组件
    let components = match create_components(&config) {
        Ok(components) => components,
        Err(e) => {
            error!("failed to create application components: {}", e);
            process::exit(1);
        }
    };

    // 创建优雅关闭顶层管理器
    let persist_enabled = components.cache.persist_enabled();
    let toplevel = Toplevel::new(move |s| async move {
        // DNS 服务器子系统
        let dns_server = components.dns_server;
        s.start(SubsystemBuilder::new("dns_server", move |handle| {
            dns_server.run(handle)
        }));
        // 缓存持久化子系统
        if persist_enabled {
            let cache = components.cache;
            s.start(SubsystemBuilder::new("cache_persist", move |handle| {
                cache.run_persist_loop(handle)
            }));
        }
    });

    // 等待关闭信号
    info!("all services started, waiting for requests");
    match toplevel
        .catch_signals()
        .handle_shutdown_requests(tokio::time::Duration::from_secs(args.shutdown_timeout))
        .await
    {
        Ok(_) => {
            info!("shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("application shutdown error: {}", e);
            process::exit(1);
        }
    }
}

// 应用组件
struct AppComponents {
    dns_server: DnsServer,
    cache: Arc<CacheManager>,
}

// 创建应用组件：缓存 -> 匹配器 -> 动作 -> 规则引擎 -> 服务器
fn create_components(config: &Config) -> Result<AppComponents, AppError> {
    let cache = Arc::new(CacheManager::new(&config.cache)?);
    if cache.enabled() {
        info!(
            size = config.cache.size,
            lazy = config.cache.lazy,
            persist = cache.persist_enabled(),
            "dns cache enabled"
        );
    } else {
        info!("dns cache disabled");
    }

    let matchers = build_matcher_map(&config.resource)?;
    info!(matcher_count = matchers.len(), "matchers initialised");

    let actions = build_action_map(&config.resource, &cache)?;
    info!(action_count = actions.len(), "actions initialised");

    let engine = build_rule_engine(&config.rules, &matchers, &actions)?;
    info!(rule_count = config.rules.len(), "rule engine initialised");

    let handler = Arc::new(RequestHandler::new(engine));
    let bind_addr = config.bind_addr()?;
    let dns_server = DnsServer::new(bind_addr, handler);
    info!(addr = %bind_addr, "dns server initialised");

    Ok(AppComponents { dns_server, cache })
}
