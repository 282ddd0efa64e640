use hickory_proto::error::ProtoError;
use std::io;
use std::net::AddrParseError;
use thiserror::Error;

// 统一错误类型
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("DNS protocol error: {0}")]
    DnsProto(#[from] ProtoError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    HttpMiddleware(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("All upstreams failed: {0}")]
    AllUpstreamsFailed(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Matcher '{name}' failed: {reason}")]
    Matcher { name: String, reason: String },

    #[error("No rule matched the request, maybe a default rule is missing")]
    NoRuleMatch,

    #[error("No host record matched: {0}")]
    NoRecordMatch(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Upstream query timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<reqwest_middleware::Error> for AppError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => Self::Http(e),
            _ => Self::HttpMiddleware(err.to_string()),
        }
    }
}

// 配置错误类型，仅在启动阶段产生，全部视为致命错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {0}")]
    LoadError(#[from] io::Error),

    #[error("YAML parsing error: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Invalid server listen address: {0}")]
    InvalidListenAddress(String),

    #[error("Invalid matcher expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    #[error("Unknown matcher type: {0}")]
    UnknownMatcherType(String),

    #[error("Unknown matcher referenced: {0}")]
    UnknownMatcher(String),

    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Rule references unknown action: {0}")]
    UnknownAction(String),

    #[error("Duplicate resource name: {0}")]
    DuplicateName(String),

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),

    #[error("Invalid domain rule: {0}")]
    InvalidDomainRule(String),

    #[error("Invalid rcode {0}, expect value in [0, 0x0fff]")]
    InvalidRcode(u16),

    #[error("Unsupported resolver scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid upstream URI '{uri}': {reason}")]
    InvalidUpstreamUri { uri: String, reason: String },

    #[error("Invalid host record: {0}")]
    InvalidHostRecord(String),

    #[error("Geosite error: {0}")]
    Geosite(String),

    #[error("HTTP client build error: {0}")]
    HttpClient(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

impl From<AddrParseError> for ConfigError {
    fn from(err: AddrParseError) -> Self {
        Self::InvalidListenAddress(err.to_string())
    }
}
