use crate::action::DnsAction;
use crate::cache::{CacheManager, CachedResolver};
use crate::error::{AppError, ConfigError};
use crate::r#const::server_defaults;
use crate::resolver::{make_resolvers, DnsResolver, GroupResolver};
use async_trait::async_trait;
use hickory_proto::op::Message;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

fn default_parallel() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct ForwardConfig {
    #[serde(default)]
    server_list: Vec<String>,
    #[serde(default = "default_parallel")]
    parallel: usize,
}

// 转发动作：把请求交给上游解析器组，全局缓存开启时在组外再套一层缓存
pub struct ForwardAction {
    name: String,
    resolver: Arc<dyn DnsResolver>,
    // 单次转发的整体超时，叠加在各传输自身的超时之上
    timeout: Duration,
}

impl ForwardAction {
    pub fn from_config(
        name: &str,
        data: &serde_json::Value,
        cache: &Arc<CacheManager>,
    ) -> Result<Self, ConfigError> {
        let cfg: ForwardConfig = crate::config::decode_data(data)?;
        if cfg.server_list.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "forward action '{}' requires server_list",
                name
            )));
        }
        let resolvers = make_resolvers(&cfg.server_list)?;
        let group: Arc<dyn DnsResolver> = Arc::new(GroupResolver::new(resolvers, cfg.parallel));
        let resolver: Arc<dyn DnsResolver> = if cache.enabled() {
            Arc::new(CachedResolver::new(group, Arc::clone(cache)))
        } else {
            group
        };
        Ok(Self {
            name: name.to_string(),
            resolver,
            timeout: Duration::from_secs(server_defaults::REQUEST_TIMEOUT_SECS),
        })
    }
}

#[async_trait]
impl DnsAction for ForwardAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "forward"
    }

    async fn perform(&self, req: &Message) -> Result<Message, AppError> {
        debug!(action = %self.name, resolver = %self.resolver.name(), "forwarding request");
        timeout(self.timeout, self.resolver.query(req))
            .await
            .map_err(|_| AppError::Timeout(self.resolver.name().to_string()))?
    }
}
