use crate::action::{reply_skeleton, DnsAction};
use crate::error::{AppError, ConfigError};
use crate::r#const::action_limits;
use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct RcodeConfig {
    #[serde(default)]
    code: u16,
}

// 固定响应码动作：应答只带配置的 rcode，各 section 为空
pub struct RcodeAction {
    name: String,
    rcode: ResponseCode,
}

impl RcodeAction {
    pub fn from_config(name: &str, data: &serde_json::Value) -> Result<Self, ConfigError> {
        let cfg: RcodeConfig = crate::config::decode_data(data)?;
        if cfg.code > action_limits::MAX_RCODE {
            return Err(ConfigError::InvalidRcode(cfg.code));
        }
        Ok(Self {
            name: name.to_string(),
            rcode: ResponseCode::from((cfg.code >> 4) as u8, (cfg.code & 0x0F) as u8),
        })
    }
}

#[async_trait]
impl DnsAction for RcodeAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "rcode"
    }

    async fn perform(&self, req: &Message) -> Result<Message, AppError> {
        let mut resp = reply_skeleton(req);
        resp.set_authoritative(true);
        resp.set_response_code(self.rcode);
        Ok(resp)
    }
}
