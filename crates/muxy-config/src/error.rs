//! Configuration loading errors.

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading matcher or listener configuration.
///
/// `Io`, `Json`, and `MatcherCompile` are fatal for the whole load: an
/// unreadable file or a matcher that fails to compile aborts startup.
/// `Listener` and `TlsKeypair` are not — `muxy-config::listeners`
/// constructs them only to log a consistent message, then degrades
/// (drops the listener, or drops just its TLS context) rather than
/// propagating them as load-aborting errors; see `spec.md` §7.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not open '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not decode JSON in '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("matcher #{index} (protocol '{protocol}'): {source}")]
    MatcherCompile {
        index: usize,
        protocol: String,
        #[source]
        source: muxy_core::MatcherCompileError,
    },

    #[error("listener '{listener}': {source}")]
    Listener {
        listener: String,
        #[source]
        source: muxy_core::UnknownFallbackProtocol,
    },

    #[error("could not load TLS keypair (cert '{cert_path}', key '{key_path}'): {message}")]
    TlsKeypair {
        cert_path: String,
        key_path: String,
        message: String,
    },
}
