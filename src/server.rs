use crate::error::AppError;
use crate::handler::RequestHandler as DnsRequestHandler;
use crate::r#const::server_defaults;
use hickory_proto::op::{Header, Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::Record;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_graceful_shutdown::{IntoSubsystem, SubsystemHandle};
use tracing::{debug, error, info};

// 把内部请求处理器适配到 hickory-server 的 RequestHandler 接口
pub struct HandlerAdapter {
    handler: Arc<DnsRequestHandler>,
}

impl HandlerAdapter {
    pub fn new(handler: Arc<DnsRequestHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait::async_trait]
impl RequestHandler for HandlerAdapter {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handler: R,
    ) -> ResponseInfo {
        debug!(client = %request.src(), "received dns request");

        // 还原为内部的 Message 表示
        let mut message = Message::new();
        message.set_id(request.id());
        message.set_op_code(request.op_code());
        message.set_message_type(request.message_type());
        message.set_recursion_desired(request.recursion_desired());
        let query = request.query();
        let mut copy = Query::new();
        copy.set_name(query.name().clone().into())
            .set_query_type(query.query_type())
            .set_query_class(query.query_class());
        message.add_query(copy);

        let result = self.handler.handle_request(&message).await;
        let header = *result.header();

        let answers: Vec<Record> = result.answers().to_vec();
        let name_servers: Vec<Record> = result.name_servers().to_vec();
        let additionals: Vec<Record> = result.additionals().to_vec();

        let builder = MessageResponseBuilder::from_message_request(request);
        let response = builder.build(
            header,
            answers.iter(),
            name_servers.iter(),
            std::iter::empty(),
            additionals.iter(),
        );

        response_handler
            .send_response(response)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "failed to send dns response");
                let mut err_header = Header::new();
                err_header.set_id(request.id());
                err_header.set_message_type(MessageType::Response);
                err_header.set_response_code(ResponseCode::ServFail);
                ResponseInfo::from(err_header)
            })
    }
}

// DNS 服务器：同一地址上同时监听 UDP 与 TCP
pub struct DnsServer {
    bind_addr: SocketAddr,
    handler: Arc<DnsRequestHandler>,
}

impl DnsServer {
    pub fn new(bind_addr: SocketAddr, handler: Arc<DnsRequestHandler>) -> Self {
        Self { bind_addr, handler }
    }

    async fn serve(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        let adapter = HandlerAdapter::new(Arc::clone(&self.handler));
        let mut server = hickory_server::ServerFuture::new(adapter);

        let udp_socket = UdpSocket::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "dns server udp listening");
        server.register_socket(udp_socket);

        let tcp_listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "dns server tcp listening");
        server.register_listener(
            tcp_listener,
            Duration::from_secs(server_defaults::TCP_TIMEOUT_SECS),
        );

        tokio::select! {
            result = server.block_until_done() => {
                info!("dns server task completed");
                result.map_err(AppError::DnsProto)
            }
            _ = subsys.on_shutdown_requested() => {
                // 停止接收新请求；在途请求由各自的超时收尾
                info!("dns server received shutdown request");
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl IntoSubsystem<AppError> for DnsServer {
    async fn run(self, subsys: SubsystemHandle) -> Result<(), AppError> {
        self.serve(subsys).await
    }
}
