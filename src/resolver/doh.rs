use crate::error::{AppError, ConfigError};
use crate::r#const::{doh_limits, http_headers, resolver_defaults};
use crate::resolver::{timeout_of, DnsResolver, TransportParams};
use async_trait::async_trait;
use hickory_proto::op::Message;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use retry_policies::Jitter;
use std::time::Duration;
use tracing::debug;

// DoH 解析器（RFC 8484）。每个实例持有独立的 HTTPS 客户端与连接池
pub struct DohResolver {
    name: String,
    endpoint: String,
    client: ClientWithMiddleware,
}

impl DohResolver {
    pub fn new(endpoint: &str, _host: &str, params: &TransportParams) -> Result<Self, ConfigError> {
        let timeout = timeout_of(params, resolver_defaults::DOH_TIMEOUT_MS);
        let client = build_client(timeout)?;
        Ok(Self {
            name: format!("doh:{}", endpoint),
            endpoint: endpoint.to_string(),
            client,
        })
    }
}

// 连接池与握手参数按传输约定收紧：每主机约 10 条连接、
// 空闲 30 秒回收、连接（含 TLS 握手）5 秒超时、不启用压缩。
// 瞬态失败交给重试中间件做有界抖动的指数退避
fn build_client(timeout: Duration) -> Result<ClientWithMiddleware, ConfigError> {
    let client = reqwest::ClientBuilder::new()
        .pool_max_idle_per_host(doh_limits::MAX_CONNS_PER_HOST)
        .pool_idle_timeout(Duration::from_secs(doh_limits::IDLE_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(doh_limits::CONNECT_TIMEOUT_SECS))
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::HttpClient(format!("failed to create doh client: {}", e)))?;

    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(
            Duration::from_secs(doh_limits::RETRY_MIN_DELAY_SECS),
            Duration::from_secs(doh_limits::RETRY_MAX_DELAY_SECS),
        )
        .jitter(Jitter::Bounded)
        .build_with_max_retries(doh_limits::RETRY_ATTEMPTS);

    Ok(ClientBuilder::new(client)
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

#[async_trait]
impl DnsResolver for DohResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, req: &Message) -> Result<Message, AppError> {
        debug!(resolver = %self.name, "doh resolver start query");
        let payload = req.to_vec()?;

        let response = self
            .client
            .post(&self.endpoint)
            .header(
                http_headers::CONTENT_TYPE,
                http_headers::content_types::DNS_MESSAGE,
            )
            .header(
                http_headers::ACCEPT,
                http_headers::content_types::DNS_MESSAGE,
            )
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // 错误响应只保留开头一段正文，避免日志被撑爆
            let body = response.bytes().await.unwrap_or_default();
            let excerpt = String::from_utf8_lossy(
                &body[..body.len().min(doh_limits::ERROR_BODY_EXCERPT)],
            )
            .into_owned();
            return Err(AppError::Upstream(format!(
                "doh {} returned {}: {}",
                self.endpoint,
                status.as_u16(),
                excerpt
            )));
        }

        let body = response.bytes().await?;
        let mut message = Message::from_vec(&body)?;
        message.set_id(req.id());
        debug!(
            resolver = %self.name,
            answer_count = message.answers().len(),
            "doh resolver query success"
        );
        Ok(message)
    }
}
