use crate::error::AppError;
use crate::matcher::DnsMatcher;
use hickory_proto::op::Message;

// 恒真匹配器。未显式配置时由引擎自动注入一个名为 any 的实例
pub struct AnyMatcher {
    name: String,
}

impl AnyMatcher {
    pub fn new(name: &str) -> Self {
        let name = if name.is_empty() { "any" } else { name };
        Self { name: name.to_string() }
    }
}

impl DnsMatcher for AnyMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "any"
    }

    fn matches(&self, _req: &Message) -> Result<bool, AppError> {
        Ok(true)
    }
}
