//! Connection-scoped errors. Every variant here is terminal for exactly
//! one connection; none ever propagates past the connection task.

use thiserror::Error;

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no protocol matched and no fallback is configured")]
    NoProtocolNoFallback,

    #[error("protocol '{0}' has no configured backend")]
    UnknownProtocol(String),

    #[error("could not dial backend '{address}': {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with backend '{address}' failed: {source}")]
    BackendTls {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with client failed: {0}")]
    ClientTls(std::io::Error),

    #[error("I/O error during connection handling: {0}")]
    Io(#[from] std::io::Error),
}
