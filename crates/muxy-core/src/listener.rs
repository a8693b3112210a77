//! A single listener's compiled, immutable configuration.
//!
//! TLS server/client contexts are deliberately absent from this type:
//! certificate loading is an external collaborator that
//! lives in `muxy-config`; the materialized TLS context is carried
//! alongside this struct by `muxy-proxy`, which is the first layer that
//! actually does I/O.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::address::AddressUrl;
use crate::matcher::Matcher;
use crate::protocol::ProtocolConfig;

/// A single listener's configuration, already validated and with its
/// matcher list intersected against its own backend map.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub id: u64,
    pub listen_address: AddressUrl,
    pub protocol_hosts: BTreeMap<String, AddressUrl>,
    pub fallback_protocol: Option<String>,
    pub discovery_timeout: Duration,
    matchers: Vec<Matcher>,
}

/// Construction failed because `fallback_protocol` does not name a key
/// of `protocol_hosts`.
#[derive(Debug, thiserror::Error)]
#[error("fallback protocol '{0}' has no corresponding backend")]
pub struct UnknownFallbackProtocol(pub String);

impl ListenerConfig {
    /// Build a listener's compiled configuration, computing the
    /// per-listener matcher intersection from the global `protocols`
    /// list: the intersection of the global matcher list with the
    /// listener's backend set, preserving global order.
    pub fn new(
        id: u64,
        listen_address: AddressUrl,
        protocol_hosts: BTreeMap<String, AddressUrl>,
        fallback_protocol: Option<String>,
        discovery_timeout: Duration,
        protocols: &ProtocolConfig,
    ) -> Result<Self, UnknownFallbackProtocol> {
        if let Some(fp) = &fallback_protocol
            && !protocol_hosts.contains_key(fp)
        {
            return Err(UnknownFallbackProtocol(fp.clone()));
        }

        let matchers = protocols.intersect(|p| protocol_hosts.contains_key(p));

        Ok(Self {
            id,
            listen_address,
            protocol_hosts,
            fallback_protocol,
            discovery_timeout,
            matchers,
        })
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn backend(&self, protocol: &str) -> Option<&AddressUrl> {
        self.protocol_hosts.get(protocol)
    }
}
