//! Network error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("secure transport is not available")]
    SecureUnavailable,

    #[error("socket is not connected")]
    NotConnected,

    #[error("socket is already connected")]
    AlreadyConnected,

    #[error("could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NetResult<T> = Result<T, NetError>;
