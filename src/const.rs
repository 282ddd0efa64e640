// 应用常量定义

//
// 服务配置默认值
//

// 监听地址默认值
pub mod server_defaults {
    // 默认监听地址，省略主机部分时补全为 0.0.0.0
    pub const DEFAULT_BIND: &str = ":5353";
    // 未指定主机时使用的地址
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    // TCP 连接空闲超时（秒）
    pub const TCP_TIMEOUT_SECS: u64 = 10;
    // 单次请求的整体处理超时（秒）
    pub const REQUEST_TIMEOUT_SECS: u64 = 6;
}

// 应用关闭等待时间限制
pub mod shutdown_timeout {
    // 默认值
    pub const DEFAULT: u64 = 30;
    // 最小值
    pub const MIN: u64 = 1;
    // 最大值
    pub const MAX: u64 = 120;
}

// 缓存配置限制
pub mod cache_limits {
    // 默认缓存大小，设置为 0 时禁用缓存
    pub const DEFAULT_SIZE: usize = 1024;
    // 默认持久化间隔（毫秒）
    pub const DEFAULT_INTERVAL_MS: u64 = 600_000;
    // 懒更新后台刷新超时（秒）
    pub const REFRESH_TIMEOUT_SECS: u64 = 5;
    // 持久化文件单行最大长度（字节）
    pub const MAX_PERSIST_LINE: usize = 1024 * 1024;
}

// 上游解析器默认参数
pub mod resolver_defaults {
    // UDP/TCP 默认端口
    pub const PLAIN_DNS_PORT: u16 = 53;
    // DoT 默认端口
    pub const DOT_PORT: u16 = 853;
    // UDP/TCP 默认超时（毫秒）
    pub const PLAIN_TIMEOUT_MS: u64 = 4000;
    // DoT 默认超时（毫秒）
    pub const DOT_TIMEOUT_MS: u64 = 6000;
    // DoH 默认超时（毫秒）
    pub const DOH_TIMEOUT_MS: u64 = 6000;
    // UDP 响应接收缓冲区大小
    pub const UDP_BUFFER_SIZE: usize = 4096;
    // TCP/DoT 响应帧最大长度
    pub const MAX_TCP_FRAME: usize = 64 * 1024;
}

// DoH 客户端配置
pub mod doh_limits {
    // 每个上游主机的最大连接数
    pub const MAX_CONNS_PER_HOST: usize = 10;
    // 空闲连接超时（秒）
    pub const IDLE_TIMEOUT_SECS: u64 = 30;
    // 连接（含 TLS 握手）超时（秒）
    pub const CONNECT_TIMEOUT_SECS: u64 = 5;
    // 错误响应摘要的最大长度（字节）
    pub const ERROR_BODY_EXCERPT: usize = 256;
    // 重试次数
    pub const RETRY_ATTEMPTS: u32 = 2;
    // 重试间隔下限（秒）
    pub const RETRY_MIN_DELAY_SECS: u64 = 1;
    // 重试间隔上限（秒）
    pub const RETRY_MAX_DELAY_SECS: u64 = 5;
}

// HTTP 头部常量
pub mod http_headers {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const ACCEPT: &str = "Accept";

    pub mod content_types {
        // RFC 8484 DoH 消息类型
        pub const DNS_MESSAGE: &str = "application/dns-message";
    }
}

// 动作相关常量
pub mod action_limits {
    // rcode 动作允许的最大响应码
    pub const MAX_RCODE: u16 = 0x0FFF;
    // host 动作合成记录的 TTL（秒）
    pub const HOST_RECORD_TTL: u32 = 5;
}
