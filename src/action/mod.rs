mod forward;
mod host;
mod rcode;

pub use forward::ForwardAction;
pub use host::HostAction;
pub use rcode::RcodeAction;

use crate::cache::CacheManager;
use crate::error::{AppError, ConfigError};
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, Query};
use std::sync::Arc;

// DNS 动作：对命中规则的请求产出响应。可以有副作用（上游 IO）
#[async_trait]
pub trait DnsAction: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> &'static str;
    async fn perform(&self, req: &Message) -> Result<Message, AppError>;
}

// 按类型名构造动作。forward 动作需要拿到全局缓存
pub fn make_action(
    kind: &str,
    name: &str,
    data: &serde_json::Value,
    cache: &Arc<CacheManager>,
) -> Result<Arc<dyn DnsAction>, ConfigError> {
    match kind.to_ascii_lowercase().as_str() {
        "forward" => Ok(Arc::new(ForwardAction::from_config(name, data, cache)?)),
        "host" => Ok(Arc::new(HostAction::from_config(name, data)?)),
        "rcode" => Ok(Arc::new(RcodeAction::from_config(name, data)?)),
        other => Err(ConfigError::UnknownActionType(other.to_string())),
    }
}

// 构造应答骨架：复制 id、opcode、question 与 RD 标志
pub(crate) fn reply_skeleton(req: &Message) -> Message {
    let mut resp = Message::new();
    resp.set_id(req.id());
    resp.set_message_type(MessageType::Response);
    resp.set_op_code(req.op_code());
    resp.set_recursion_desired(req.recursion_desired());
    for query in req.queries() {
        let mut copy = Query::new();
        copy.set_name(query.name().clone())
            .set_query_type(query.query_type())
            .set_query_class(query.query_class());
        resp.add_query(copy);
    }
    resp
}
