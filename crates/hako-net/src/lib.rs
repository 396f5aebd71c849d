//! # hako-net
//!
//! Transport boundary for hako: an [`AsyncSocketFactory`] hands out
//! [`AsyncClient`] and [`AsyncServer`] objects, and [`listen`] /
//! [`incoming`] turn a server into an accept loop.
//!
//! [`TcpSocketFactory`] is the plain transport over `tokio::net`. Secure
//! transports plug in through the same factory trait.

mod error;
mod listen;
mod socket;
mod tcp;

pub use error::{NetError, NetResult};
pub use listen::{incoming, listen, ListenHandle, ACCEPT_ERROR_BACKOFF};
pub use socket::{create_tcp_client, AsyncClient, AsyncServer, AsyncSocketFactory, ANY_PORT};
pub use tcp::{TcpClient, TcpServer, TcpSocketFactory};
