//! Loads on-disk JSON configuration into the compiled types
//! `muxy-core` describes, and materializes the TLS server/client
//! contexts that `muxy-core` deliberately leaves out.

pub mod error;
pub mod listeners;
pub mod matchers;
pub mod tls;

pub use error::{ConfigError, ConfigResult};
pub use listeners::MaterializedListener;
