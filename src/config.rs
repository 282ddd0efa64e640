use crate::error::ConfigError;
use crate::r#const::{cache_limits, server_defaults};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;
use validator::{Validate, ValidationError};

// 配置结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;

// 把资源的 data 块解析成各工厂自己的强类型参数。
// 缺省的 data 视为空对象
pub fn decode_data<T: serde::de::DeserializeOwned>(
    data: &serde_json::Value,
) -> Result<T, serde_json::Error> {
    if data.is_null() {
        serde_json::from_value(serde_json::Value::Object(serde_json::Map::new()))
    } else {
        serde_json::from_value(data.clone())
    }
}

// 自定义验证函数 - 验证监听地址格式（允许省略主机部分，如 ":5353"）
fn validate_bind_addr(addr: &str) -> Result<(), ValidationError> {
    match SocketAddr::from_str(&normalize_bind(addr)) {
        Ok(_) => Ok(()),
        Err(_) => Err(ValidationError::new("invalid_bind_addr")),
    }
}

// 将 ":5353" 形式的地址补全为 "0.0.0.0:5353"
pub fn normalize_bind(addr: &str) -> String {
    let addr = addr.trim();
    if addr.starts_with(':') {
        format!("{}{}", server_defaults::DEFAULT_HOST, addr)
    } else {
        addr.to_string()
    }
}

// 应用配置
#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct Config {
    // 监听地址，UDP 与 TCP 共用
    #[serde(default = "default_bind")]
    #[validate(custom(function = "validate_bind_addr", message = "Invalid listen address"))]
    pub bind: String,
    // 日志配置
    #[serde(default)]
    pub log: LogConfig,
    // 缓存配置
    #[serde(default)]
    pub cache: CacheConfig,
    // 资源定义：匹配器与动作
    #[serde(default)]
    pub resource: ResourceConfig,
    // 规则列表，按配置顺序求值
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_bind() -> String {
    server_defaults::DEFAULT_BIND.to_string()
}

// 日志配置。轮转相关字段会被接受但由日志后端按需使用
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub file_count: u32,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub keep_days: u32,
    #[serde(default = "default_console")]
    pub console: bool,
}

fn default_console() -> bool {
    true
}

// 缓存配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    // 缓存条目上限，0 表示禁用缓存
    #[serde(default = "default_cache_size")]
    pub size: usize,
    // 过期条目是否可先返回再后台刷新
    #[serde(default)]
    pub lazy: bool,
    // 是否开启落盘
    #[serde(default)]
    pub persist: bool,
    // 落盘文件路径
    #[serde(default)]
    pub file: String,
    // 落盘间隔（毫秒）
    #[serde(default = "default_cache_interval")]
    pub interval: u64,
}

fn default_cache_size() -> usize {
    cache_limits::DEFAULT_SIZE
}

fn default_cache_interval() -> u64 {
    cache_limits::DEFAULT_INTERVAL_MS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: default_cache_size(),
            lazy: false,
            persist: false,
            file: String::new(),
            interval: default_cache_interval(),
        }
    }
}

// 资源配置
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResourceConfig {
    #[serde(default)]
    pub matcher: Vec<ResourceItem>,
    #[serde(default)]
    pub action: Vec<ResourceItem>,
}

// 单个资源定义。data 的具体形状由各工厂自行解析
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResourceItem {
    pub name: String,
    pub r#type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

// 规则配置
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuleConfig {
    // 规则备注，缺省时按序号生成
    #[serde(default)]
    pub remark: String,
    // 匹配表达式，空表达式等价于 any
    #[serde(default, rename = "match")]
    pub matches: String,
    // 引用的动作名
    pub action: String,
}

impl Config {
    // 从文件加载配置，根据扩展名识别格式，无法识别时做内容探测
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!("Loading configuration file: {:?}", path);
        let content = fs::read_to_string(path).map_err(ConfigError::LoadError)?;

        let config: Config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => {
                // 扩展名未知时先按 JSON 解析，失败再按 YAML
                match serde_json::from_str(&content) {
                    Ok(cfg) => cfg,
                    Err(_) => serde_yaml::from_str(&content)?,
                }
            }
        };
        config.validate_all()?;
        Ok(config)
    }

    // 监听地址（已补全主机部分）
    pub fn bind_addr(&self) -> ConfigResult<SocketAddr> {
        normalize_bind(&self.bind)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::from(e))
    }

    // 验证配置有效性
    pub fn validate_all(&self) -> ConfigResult<()> {
        if let Err(errors) = Validate::validate(self) {
            return Err(ConfigError::ValidationError(errors.to_string()));
        }

        // 资源名称必须全局唯一
        let mut names = HashSet::new();
        for item in self.resource.matcher.iter().chain(self.resource.action.iter()) {
            if item.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "resource name must not be empty".to_string(),
                ));
            }
            if !names.insert(item.name.clone()) {
                return Err(ConfigError::DuplicateName(item.name.clone()));
            }
        }

        // 规则必须引用已定义的动作
        let action_names: HashSet<_> = self.resource.action.iter().map(|a| a.name.as_str()).collect();
        for rule in &self.rules {
            if !action_names.contains(rule.action.as_str()) {
                return Err(ConfigError::UnknownAction(rule.action.clone()));
            }
        }

        // 开启持久化时必须给出文件路径
        if self.cache.persist && self.cache.file.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cache.persist requires cache.file".to_string(),
            ));
        }
        Ok(())
    }
}
