use crate::error::{AppError, ConfigError};
use crate::matcher::DnsMatcher;
use hickory_proto::op::Message;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
struct QclassConfig {
    #[serde(default)]
    classes: Vec<u16>,
}

// 查询类匹配器，与 qtype 同构
pub struct QclassMatcher {
    name: String,
    classes: HashSet<u16>,
}

impl QclassMatcher {
    pub fn from_config(name: &str, data: &serde_json::Value) -> Result<Self, ConfigError> {
        let cfg: QclassConfig = crate::config::decode_data(data)?;
        Ok(Self {
            name: name.to_string(),
            classes: cfg.classes.into_iter().collect(),
        })
    }
}

impl DnsMatcher for QclassMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "qclass"
    }

    fn matches(&self, req: &Message) -> Result<bool, AppError> {
        for query in req.queries() {
            if self.classes.contains(&u16::from(query.query_class())) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
