//! muxy-core — protocol-sniffing reverse proxy configuration model.
//!
//! This crate owns no sockets and does no I/O. It describes *what* a
//! listener looks like once configuration has been parsed and matchers
//! compiled:
//!
//! - **`address`** — the `proto[+tls]{opts}://host` address URL grammar
//! - **`matcher`** — regex and byte-literal protocol matchers
//! - **`protocol`** — an ordered set of matchers
//! - **`listener`** — a single listener's compiled, immutable configuration
//! - **`ids`** — process-wide monotonic listener/connection id counters

pub mod address;
pub mod error;
pub mod ids;
pub mod listener;
pub mod matcher;
pub mod protocol;

pub use address::AddressUrl;
pub use error::{MatcherCompileError, MatcherCompileResult};
pub use listener::{ListenerConfig, UnknownFallbackProtocol};
pub use matcher::{Matcher, Target};
pub use protocol::ProtocolConfig;
