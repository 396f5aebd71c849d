//! Plain TCP transport over `tokio::net`.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

use crate::error::{NetError, NetResult};
use crate::socket::{AsyncClient, AsyncServer, AsyncSocketFactory};

/// Factory for unencrypted TCP sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpSocketFactory;

impl TcpSocketFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AsyncSocketFactory for TcpSocketFactory {
    fn create_client(&self, secure: bool) -> NetResult<Box<dyn AsyncClient>> {
        if secure {
            return Err(NetError::SecureUnavailable);
        }
        Ok(Box::new(TcpClient::new()))
    }

    async fn create_server(
        &self,
        port: u16,
        host: &str,
        backlog: u32,
        secure: bool,
    ) -> NetResult<Arc<dyn AsyncServer>> {
        if secure {
            return Err(NetError::SecureUnavailable);
        }
        Ok(Arc::new(TcpServer::bind(host, port, backlog).await?))
    }
}

/// TCP connection, either dialed with `connect` or handed out by `accept`.
#[derive(Debug, Default)]
pub struct TcpClient {
    stream: Option<TcpStream>,
}

impl TcpClient {
    pub fn new() -> Self {
        Self { stream: None }
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn stream_mut(&mut self) -> NetResult<&mut TcpStream> {
        self.stream.as_mut().ok_or(NetError::NotConnected)
    }
}

#[async_trait]
impl AsyncClient for TcpClient {
    async fn connect(&mut self, host: &str, port: u16) -> NetResult<()> {
        if self.stream.is_some() {
            return Err(NetError::AlreadyConnected);
        }
        let stream = TcpStream::connect((host, port)).await?;
        tracing::debug!(host, port, "connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> NetResult<usize> {
        Ok(self.stream_mut()?.read(buf).await?)
    }

    async fn write(&mut self, data: &[u8]) -> NetResult<()> {
        Ok(self.stream_mut()?.write_all(data).await?)
    }

    async fn close(&mut self) -> NetResult<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }

    fn connected(&self) -> bool {
        self.stream.is_some()
    }
}

/// Listening TCP socket.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    host: String,
    requested_port: u16,
    port: u16,
    backlog: u32,
}

impl TcpServer {
    /// Resolve `host` and listen on the first address it yields.
    pub async fn bind(host: &str, port: u16, backlog: u32) -> NetResult<Self> {
        let addr = lookup_host((host, port))
            .await?
            .next()
            .ok_or_else(|| NetError::Resolve {
                host: host.to_string(),
                port,
            })?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(backlog)?;
        let bound = listener.local_addr()?;

        Ok(Self {
            listener,
            host: host.to_string(),
            requested_port: port,
            port: bound.port(),
            backlog,
        })
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl AsyncServer for TcpServer {
    async fn accept(&self) -> NetResult<Box<dyn AsyncClient>> {
        let (stream, peer) = self.listener.accept().await?;
        tracing::debug!(%peer, "accepted connection");
        Ok(Box::new(TcpClient::from_stream(stream)))
    }

    fn requested_port(&self) -> u16 {
        self.requested_port
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn backlog(&self) -> u32 {
        self.backlog
    }
}
