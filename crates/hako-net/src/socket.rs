//! Client, server and factory traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::NetResult;

/// Port value asking the OS to pick a free port.
pub const ANY_PORT: u16 = 0;

/// Bidirectional byte stream to a peer.
#[async_trait]
pub trait AsyncClient: Send {
    /// Connect to `host:port`. Fails if already connected.
    async fn connect(&mut self, host: &str, port: u16) -> NetResult<()>;

    /// Read into `buf`, returning the byte count. `0` means the peer closed.
    async fn read(&mut self, buf: &mut [u8]) -> NetResult<usize>;

    /// Write all of `data`.
    async fn write(&mut self, data: &[u8]) -> NetResult<()>;

    /// Shut the connection down. Closing twice is a no-op.
    async fn close(&mut self) -> NetResult<()>;

    fn connected(&self) -> bool;
}

/// Bound listening socket.
#[async_trait]
pub trait AsyncServer: Send + Sync {
    /// Wait for the next connection.
    async fn accept(&self) -> NetResult<Box<dyn AsyncClient>>;

    /// Port passed at creation, possibly [`ANY_PORT`].
    fn requested_port(&self) -> u16;

    /// Port actually bound.
    fn port(&self) -> u16;

    fn host(&self) -> &str;

    fn backlog(&self) -> u32;
}

/// Creates clients and servers for one transport family.
///
/// `secure` selects the encrypted variant of the transport; factories that
/// don't have one fail with [`NetError::SecureUnavailable`](crate::NetError::SecureUnavailable).
#[async_trait]
pub trait AsyncSocketFactory: Send + Sync {
    fn create_client(&self, secure: bool) -> NetResult<Box<dyn AsyncClient>>;

    async fn create_server(
        &self,
        port: u16,
        host: &str,
        backlog: u32,
        secure: bool,
    ) -> NetResult<Arc<dyn AsyncServer>>;
}

/// Create a client from `factory` and connect it.
pub async fn create_tcp_client(
    factory: &dyn AsyncSocketFactory,
    host: &str,
    port: u16,
    secure: bool,
) -> NetResult<Box<dyn AsyncClient>> {
    let mut client = factory.create_client(secure)?;
    client.connect(host, port).await?;
    Ok(client)
}
