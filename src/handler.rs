use crate::engine::RuleEngine;
use crate::error::AppError;
use futures::FutureExt;
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info_span, warn, Instrument};

// 入站请求处理器。为每个请求分配单调递增的 trace id，
// 驱动规则引擎并把结果整理成可回写的应答
pub struct RequestHandler {
    engine: RuleEngine,
    trace_counter: AtomicU64,
}

impl RequestHandler {
    pub fn new(engine: RuleEngine) -> Self {
        Self {
            engine,
            trace_counter: AtomicU64::new(1),
        }
    }

    // 处理单个已解析的请求。所有失败路径都折叠成 SERVFAIL，
    // 保证调用方总能拿到一个可发送的应答
    pub async fn handle_request(&self, req: &Message) -> Message {
        let trace_id = self.trace_counter.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("dns_request", trace_id);
        async move {
            let mut resp = self.process(req).await;
            // 应答出站前的统一修正：回写请求 id、置 RA、补齐 question
            resp.set_id(req.id());
            resp.set_recursion_available(true);
            if resp.queries().is_empty() {
                for query in req.queries() {
                    resp.add_query(query.clone());
                }
            }
            resp
        }
        .instrument(span)
        .await
    }

    async fn process(&self, req: &Message) -> Message {
        // 非查询请求与空 question 不进入引擎
        if req.op_code() != OpCode::Query || req.message_type() != MessageType::Query {
            warn!(op_code = ?req.op_code(), "unsupported dns request, answering servfail");
            return error_response(req, ResponseCode::ServFail);
        }
        if req.queries().is_empty() {
            warn!("request without question section, answering servfail");
            return error_response(req, ResponseCode::ServFail);
        }

        let query = &req.queries()[0];
        debug!(
            qname = %query.name().to_utf8(),
            qtype = %query.query_type(),
            "processing dns query"
        );

        // 引擎内部的 panic 只影响当前请求
        match AssertUnwindSafe(self.engine.execute(req)).catch_unwind().await {
            Ok(Ok(resp)) => resp,
            Ok(Err(err)) => {
                log_engine_error(query.name().to_utf8(), &err);
                error_response(req, ResponseCode::ServFail)
            }
            Err(_) => {
                error!("panic recovered while handling dns request");
                error_response(req, ResponseCode::ServFail)
            }
        }
    }
}

fn log_engine_error(qname: String, err: &AppError) {
    match err {
        AppError::NoRuleMatch => warn!(qname = %qname, "no rule matched the request"),
        other => warn!(qname = %qname, error = %other, "rule engine failed"),
    }
}

// 构造带指定响应码的空应答
pub fn error_response(req: &Message, code: ResponseCode) -> Message {
    let mut resp = Message::new();
    resp.set_id(req.id());
    resp.set_message_type(MessageType::Response);
    resp.set_op_code(req.op_code());
    resp.set_recursion_desired(req.recursion_desired());
    resp.set_recursion_available(true);
    resp.set_response_code(code);
    for query in req.queries() {
        resp.add_query(query.clone());
    }
    resp
}
