use crate::error::{AppError, ConfigError};
use crate::matcher::DnsMatcher;
use hickory_proto::op::Message;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
struct QtypeConfig {
    #[serde(default)]
    types: Vec<u16>,
}

// 查询类型匹配器：任一 question 的 qtype 命中集合即为真
pub struct QtypeMatcher {
    name: String,
    types: HashSet<u16>,
}

impl QtypeMatcher {
    pub fn from_config(name: &str, data: &serde_json::Value) -> Result<Self, ConfigError> {
        let cfg: QtypeConfig = crate::config::decode_data(data)?;
        Ok(Self {
            name: name.to_string(),
            types: cfg.types.into_iter().collect(),
        })
    }
}

impl DnsMatcher for QtypeMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "qtype"
    }

    fn matches(&self, req: &Message) -> Result<bool, AppError> {
        for query in req.queries() {
            if self.types.contains(&u16::from(query.query_type())) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
