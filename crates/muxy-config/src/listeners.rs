//! Loads the listener configuration document and materializes each
//! listener's compiled `muxy_core::ListenerConfig` plus its optional
//! TLS server acceptor.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use muxy_core::{AddressUrl, ListenerConfig, ProtocolConfig};
use serde::Deserialize;
use tokio_rustls::TlsAcceptor;
use tracing::{error, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::tls::{self, CertKeyPair};

#[derive(Debug, Deserialize)]
struct TlsEntry {
    certificate_path: String,
    private_key_path: String,
}

#[derive(Debug, Deserialize)]
struct ListenerEntry {
    listener_address: String,
    protocol_hosts: BTreeMap<String, String>,
    fallback_protocol: Option<String>,
    #[serde(default)]
    tls: Vec<TlsEntry>,
    protocol_discovery_timeout: f64,
}

/// A listener's compiled configuration, paired with its materialized
/// TLS server acceptor, if any.
pub struct MaterializedListener {
    pub config: ListenerConfig,
    pub tls_acceptor: Option<TlsAcceptor>,
}

/// Load the listener configuration file, validating each entry against
/// `protocols` and compiling its matcher list and TLS context.
///
/// A malformed file (unreadable, or not valid JSON) fails the whole
/// load. Past that point, per-listener problems never abort sibling
/// listeners: an invalid fallback protocol drops just that listener
/// (logged), and a TLS keypair load failure drops just that listener's
/// TLS context, leaving it to run as a plain listener (also logged) —
/// see `spec.md` §7.
pub fn load(path: impl AsRef<Path>, protocols: &ProtocolConfig) -> ConfigResult<Vec<MaterializedListener>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_str(&text, &path.display().to_string(), protocols)
}

/// Load listener configuration from an already-read JSON string.
pub fn load_str(
    text: &str,
    source_name: &str,
    protocols: &ProtocolConfig,
) -> ConfigResult<Vec<MaterializedListener>> {
    let entries: Vec<ListenerEntry> =
        serde_json::from_str(text).map_err(|source| ConfigError::Json {
            path: source_name.to_string(),
            source,
        })?;

    Ok(entries
        .into_iter()
        .filter_map(|entry| materialize(entry, protocols))
        .collect())
}

/// Materialize one listener entry, or `None` if its fallback protocol is
/// invalid (logged, listener dropped). A TLS keypair that fails to load
/// does not drop the listener — it degrades to `tls_acceptor: None` and
/// is logged separately.
fn materialize(entry: ListenerEntry, protocols: &ProtocolConfig) -> Option<MaterializedListener> {
    let listen_address = AddressUrl::parse(&entry.listener_address);

    let protocol_hosts: BTreeMap<String, AddressUrl> = entry
        .protocol_hosts
        .into_iter()
        .map(|(protocol, url)| (protocol, AddressUrl::parse(&url)))
        .collect();

    let id = muxy_core::ids::next_listener_id();
    let discovery_timeout = Duration::from_secs_f64(entry.protocol_discovery_timeout.max(0.0));

    let config = match ListenerConfig::new(
        id,
        listen_address.clone(),
        protocol_hosts,
        entry.fallback_protocol,
        discovery_timeout,
        protocols,
    ) {
        Ok(config) => config,
        Err(source) => {
            let err = ConfigError::Listener {
                listener: listen_address.encode(),
                source,
            };
            error!(error = %err, "listener configuration rejected; skipping this listener");
            return None;
        }
    };

    let tls_acceptor = if entry.tls.is_empty() {
        None
    } else {
        let pairs: Vec<CertKeyPair> = entry
            .tls
            .into_iter()
            .map(|e| CertKeyPair {
                certificate_path: e.certificate_path,
                private_key_path: e.private_key_path,
            })
            .collect();
        match tls::build_acceptor(&pairs) {
            Ok(acceptor) => Some(acceptor),
            Err(source) => {
                warn!(
                    listener = %listen_address.encode(),
                    error = %source,
                    "TLS keypair failed to load; listener continues without TLS"
                );
                None
            }
        }
    };

    Some(MaterializedListener {
        config,
        tls_acceptor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxy_core::Matcher;
    use muxy_core::matcher::Target;

    fn sample_protocols() -> ProtocolConfig {
        ProtocolConfig::new(vec![Matcher::compile_string("http", Target::Line, "GET ")])
    }

    #[test]
    fn loads_a_plain_listener_with_no_tls() {
        let json = r#"[{
            "listener_address": "tcp://0.0.0.0:8443",
            "protocol_hosts": {"http": "tcp://127.0.0.1:8080"},
            "fallback_protocol": null,
            "protocol_discovery_timeout": 5.0
        }]"#;

        let listeners = load_str(json, "test", &sample_protocols()).unwrap();
        assert_eq!(listeners.len(), 1);
        let listener = &listeners[0];
        assert!(listener.tls_acceptor.is_none());
        assert_eq!(listener.config.matchers().len(), 1);
        assert_eq!(
            listener.config.discovery_timeout,
            Duration::from_secs_f64(5.0)
        );
    }

    #[test]
    fn unknown_fallback_protocol_drops_only_that_listener() {
        let json = r#"[
            {
                "listener_address": "tcp://0.0.0.0:8443",
                "protocol_hosts": {"http": "tcp://127.0.0.1:8080"},
                "fallback_protocol": "ssh",
                "protocol_discovery_timeout": 5.0
            },
            {
                "listener_address": "tcp://0.0.0.0:2222",
                "protocol_hosts": {"http": "tcp://127.0.0.1:8080"},
                "fallback_protocol": null,
                "protocol_discovery_timeout": 5.0
            }
        ]"#;

        let listeners = load_str(json, "test", &sample_protocols()).unwrap();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].config.listen_address.host, "0.0.0.0:2222");
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        let err = load_str("not json", "test", &sample_protocols()).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn missing_tls_file_degrades_listener_to_no_tls_instead_of_failing() {
        let json = r#"[{
            "listener_address": "tcp://0.0.0.0:8443",
            "protocol_hosts": {"http": "tcp://127.0.0.1:8080"},
            "fallback_protocol": null,
            "tls": [{"certificate_path": "/nope/cert.pem", "private_key_path": "/nope/key.pem"}],
            "protocol_discovery_timeout": 5.0
        }]"#;

        let listeners = load_str(json, "test", &sample_protocols()).unwrap();
        assert_eq!(listeners.len(), 1);
        assert!(listeners[0].tls_acceptor.is_none());
    }
}
