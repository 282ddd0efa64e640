mod any;
mod domain;
pub mod expr;
mod geosite;
mod qclass;
mod qtype;

pub use any::AnyMatcher;
pub use domain::DomainMatcher;
pub use expr::ExpressionMatcher;

use crate::error::{AppError, ConfigError};
use hickory_proto::op::Message;
use std::collections::HashMap;
use std::sync::Arc;

// DNS 请求匹配器。构造后只读，可被多个规则共享
pub trait DnsMatcher: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> &'static str;
    fn matches(&self, req: &Message) -> Result<bool, AppError>;
}

// 匹配器名称到实例的映射
pub type MatcherMap = HashMap<String, Arc<dyn DnsMatcher>>;

// 按类型名构造匹配器，data 由各实现自行解析
pub fn make_matcher(
    kind: &str,
    name: &str,
    data: &serde_json::Value,
) -> Result<Arc<dyn DnsMatcher>, ConfigError> {
    match kind.to_ascii_lowercase().as_str() {
        "any" => Ok(Arc::new(AnyMatcher::new(name))),
        "domain" => Ok(Arc::new(domain::DomainMatcher::from_config(name, data)?)),
        "qtype" => Ok(Arc::new(qtype::QtypeMatcher::from_config(name, data)?)),
        "qclass" => Ok(Arc::new(qclass::QclassMatcher::from_config(name, data)?)),
        "geosite" => geosite::make_geosite_matcher(name, data),
        other => Err(ConfigError::UnknownMatcherType(other.to_string())),
    }
}

// 域名规范化：小写并去掉末尾的点
pub fn normalize_domain(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

// 取请求的第一个 question 的域名（规范化后）。路由只参考第一个 question
pub fn first_question_name(req: &Message) -> Option<String> {
    req.queries().first().map(|q| normalize_domain(&q.name().to_utf8()))
}
