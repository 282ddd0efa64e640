use crate::error::{AppError, ConfigError};
use crate::r#const::resolver_defaults;
use crate::resolver::{timeout_of, DnsResolver, TransportParams};
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use hickory_proto::op::Message;
use rustls::pki_types::ServerName;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

// 传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Udp,
    Tcp,
    Dot,
}

// 经典无状态解析器：UDP、TCP 与 DoT。
// 每次查询独立建立连接，由自身超时与调用方截止时间共同约束
pub struct ClassicResolver {
    name: String,
    transport: Transport,
    // 目标地址字符串，host 可能是域名，连接时再解析
    addr: String,
    timeout: Duration,
    tls: Option<(TlsConnector, ServerName<'static>)>,
}

impl ClassicResolver {
    pub fn new(
        scheme: &str,
        host: &str,
        port: Option<u16>,
        params: &TransportParams,
    ) -> Result<Self, ConfigError> {
        let (transport, default_port, default_timeout) = match scheme {
            "udp" => (
                Transport::Udp,
                resolver_defaults::PLAIN_DNS_PORT,
                resolver_defaults::PLAIN_TIMEOUT_MS,
            ),
            "tcp" => (
                Transport::Tcp,
                resolver_defaults::PLAIN_DNS_PORT,
                resolver_defaults::PLAIN_TIMEOUT_MS,
            ),
            "dot" => (
                Transport::Dot,
                resolver_defaults::DOT_PORT,
                resolver_defaults::DOT_TIMEOUT_MS,
            ),
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        let port = port.unwrap_or(default_port);
        let addr = join_host_port(host, port);

        // DoT 的 SNI 取 URI 的主机名部分
        let tls = if transport == Transport::Dot {
            let server_name = ServerName::try_from(host.to_string()).map_err(|e| {
                ConfigError::InvalidUpstreamUri {
                    uri: addr.clone(),
                    reason: format!("invalid tls server name: {}", e),
                }
            })?;
            Some((build_tls_connector(), server_name))
        } else {
            None
        };

        Ok(Self {
            name: format!("{}/{}", scheme, addr),
            transport,
            addr,
            timeout: timeout_of(params, default_timeout),
            tls,
        })
    }

    async fn exchange_udp(&self, payload: &[u8]) -> Result<Vec<u8>, AppError> {
        let local: SocketAddr = if self.is_v6_target() {
            "[::]:0".parse().unwrap()
        } else {
            "0.0.0.0:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.addr.as_str()).await?;
        socket.send(payload).await?;
        let mut buf = vec![0u8; resolver_defaults::UDP_BUFFER_SIZE];
        let len = socket.recv(&mut buf).await?;
        if len == 0 {
            return Err(AppError::Upstream(format!("no response from {}", self.addr)));
        }
        buf.truncate(len);
        Ok(buf)
    }

    async fn exchange_tcp(&self, payload: &[u8]) -> Result<Vec<u8>, AppError> {
        let stream = TcpStream::connect(self.addr.as_str()).await?;
        self.exchange_framed(stream, payload).await
    }

    async fn exchange_dot(&self, payload: &[u8]) -> Result<Vec<u8>, AppError> {
        let (connector, server_name) = self
            .tls
            .as_ref()
            .ok_or_else(|| AppError::Tls("tls connector not initialised".to_string()))?;
        let stream = TcpStream::connect(self.addr.as_str()).await?;
        let stream = connector
            .connect(server_name.clone(), stream)
            .await
            .map_err(|e| AppError::Tls(format!("tls handshake with {}: {}", self.addr, e)))?;
        self.exchange_framed(stream, payload).await
    }

    // TCP 与 DoT 共用 2 字节长度前缀的帧格式
    async fn exchange_framed<S>(&self, mut stream: S, payload: &[u8]) -> Result<Vec<u8>, AppError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = BytesMut::with_capacity(2 + payload.len());
        framed.put_u16(payload.len() as u16);
        framed.put_slice(payload);
        stream.write_all(&framed).await?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let frame_len = u16::from_be_bytes(len_buf) as usize;
        if frame_len == 0 || frame_len > resolver_defaults::MAX_TCP_FRAME {
            return Err(AppError::Upstream(format!(
                "invalid response frame length {} from {}",
                frame_len, self.addr
            )));
        }
        let mut buf = vec![0u8; frame_len];
        stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    fn is_v6_target(&self) -> bool {
        self.addr
            .rsplit_once(':')
            .map(|(host, _)| host.trim_start_matches('[').trim_end_matches(']'))
            .and_then(|host| host.parse::<IpAddr>().ok())
            .map(|ip| ip.is_ipv6())
            .unwrap_or(false)
    }
}

#[async_trait]
impl DnsResolver for ClassicResolver {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, req: &Message) -> Result<Message, AppError> {
        let payload = req.to_vec()?;
        debug!(resolver = %self.name, "classic resolver start query");
        let exchange = async {
            match self.transport {
                Transport::Udp => self.exchange_udp(&payload).await,
                Transport::Tcp => self.exchange_tcp(&payload).await,
                Transport::Dot => self.exchange_dot(&payload).await,
            }
        };
        let raw = timeout(self.timeout, exchange)
            .await
            .map_err(|_| AppError::Timeout(self.name.clone()))??;
        let resp = Message::from_vec(&raw)?;
        debug!(
            resolver = %self.name,
            answer_count = resp.answers().len(),
            "classic resolver query success"
        );
        Ok(resp)
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    // IPv6 字面量需要加方括号
    if host.parse::<IpAddr>().map(|ip| ip.is_ipv6()).unwrap_or(false) {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

// webpki 根证书 + TLS 1.2 及以上（rustls 默认协议集）
fn build_tls_connector() -> TlsConnector {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}
