//! Per-connection orchestration: discovery, protocol resolution,
//! backend dial, optional rewriting, then the bidirectional relay.

use std::net::IpAddr;
use std::sync::Arc;

use muxy_core::ListenerConfig;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

use crate::discovery::{self, DiscoveryResult};
use crate::error::{ConnectionError, ConnectionResult};
use crate::http_rewrite;
use crate::realip;
use crate::{backend, relay};

/// Handles one accepted connection end to end. `listener` is shared
/// across every connection accepted on that listener; `tls_connector`
/// is the (non-verifying) client context used for TLS backend dials.
pub struct ConnectionHandler {
    pub listener: Arc<ListenerConfig>,
    pub tls_connector: TlsConnector,
    pub connection_id: u64,
}

impl ConnectionHandler {
    /// Run discovery, resolve a backend, optionally rewrite/prefix, and
    /// relay until either side closes. Never returns an error across a
    /// connection boundary — callers should only log what comes back.
    pub async fn handle<C>(&self, mut client: C, mut remote_ip: IpAddr) -> ConnectionResult<()>
    where
        C: AsyncRead + AsyncWrite + Unpin,
    {
        let tag = muxy_core::ids::tag_conn(self.listener.id, self.connection_id);
        let send_real_ip = discovery::listener_wants_real_ip(&self.listener.listen_address);

        let DiscoveryResult {
            protocol,
            mut head_bytes,
            remote_ip_from_preamble,
        } = discovery::discover(
            &mut client,
            self.listener.matchers(),
            self.listener.discovery_timeout,
            send_real_ip,
        )
        .await;

        if let Some(ip) = remote_ip_from_preamble {
            remote_ip = ip;
        }

        let protocol = protocol
            .or_else(|| self.listener.fallback_protocol.clone())
            .ok_or(ConnectionError::NoProtocolNoFallback)?;

        let backend_address = self
            .listener
            .backend(&protocol)
            .ok_or_else(|| ConnectionError::UnknownProtocol(protocol.clone()))?
            .clone();

        info!(%tag, protocol = %protocol, backend = %backend_address.encode(), "protocol matched");

        let mut server = backend::dial(&backend_address, &self.tls_connector).await?;

        if protocol == "http" && backend_address.has_option("http_send_x_forwarded_for") {
            http_rewrite::read_headers_to_end(&mut client, &mut head_bytes)
                .await
                .map_err(ConnectionError::Io)?;
            head_bytes = http_rewrite::rewrite(&head_bytes, remote_ip);
        }

        if backend_address.has_option("send_real_ip") {
            let preamble = realip::encode(remote_ip);
            server
                .write_all(&preamble)
                .await
                .map_err(ConnectionError::Io)?;
        }

        server.write_all(&head_bytes).await.map_err(ConnectionError::Io)?;

        let (from_client, from_server) = relay::relay(&mut client, &mut server)
            .await
            .map_err(ConnectionError::Io)?;

        info!(
            %tag,
            bytes_from_client = from_client,
            bytes_from_server = from_server,
            "connection closed"
        );

        Ok(())
    }
}

/// Log a connection-scoped error at the severity its variant warrants.
pub fn log_connection_error(tag: &str, err: &ConnectionError) {
    match err {
        ConnectionError::NoProtocolNoFallback | ConnectionError::UnknownProtocol(_) => {
            warn!(%tag, error = %err, "connection closed: no route");
        }
        _ => {
            warn!(%tag, error = %err, "connection closed: backend error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxy_core::matcher::Target;
    use muxy_core::{AddressUrl, Matcher, ProtocolConfig};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn spawn_echo_backend() -> (std::net::SocketAddr, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buf[..n]),
                }
                if received.len() >= 36 {
                    break;
                }
            }
            received
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn routes_http_request_to_configured_backend() {
        let (backend_addr, backend_task) = spawn_echo_backend().await;

        let protocols = ProtocolConfig::new(vec![Matcher::compile_regex(
            "http",
            Target::Line,
            r"^(GET|POST|PUT|DELETE|HEAD) .*HTTP/1\.[01]$",
        )
        .unwrap()]);

        let mut hosts = BTreeMap::new();
        hosts.insert("http".to_string(), AddressUrl::parse(&format!("tcp://{backend_addr}")));

        let listener = ListenerConfig::new(
            1,
            AddressUrl::parse("tcp://0.0.0.0:0"),
            hosts,
            None,
            Duration::from_secs(2),
            &protocols,
        )
        .unwrap();

        let handler = ConnectionHandler {
            listener: Arc::new(listener),
            tls_connector: muxy_config::tls::build_connector(),
            connection_id: 1,
        };

        let (client_side, mut test_side) = tokio::io::duplex(256);
        let remote_ip: IpAddr = "127.0.0.1".parse().unwrap();

        let client_task = tokio::spawn(async move { handler.handle(client_side, remote_ip).await });

        test_side
            .write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();
        drop(test_side);

        client_task.await.unwrap().unwrap();
        let received = backend_task.await.unwrap();
        assert_eq!(received, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    }

    #[tokio::test]
    async fn no_match_and_no_fallback_is_an_error() {
        let protocols = ProtocolConfig::new(vec![]);
        let listener = ListenerConfig::new(
            1,
            AddressUrl::parse("tcp://0.0.0.0:0"),
            BTreeMap::new(),
            None,
            Duration::from_millis(50),
            &protocols,
        )
        .unwrap();

        let handler = ConnectionHandler {
            listener: Arc::new(listener),
            tls_connector: muxy_config::tls::build_connector(),
            connection_id: 1,
        };

        let (client_side, mut test_side) = tokio::io::duplex(256);
        test_side.write_all(b"garbage\n").await.unwrap();
        drop(test_side);

        let remote_ip: IpAddr = "127.0.0.1".parse().unwrap();
        let err = handler.handle(client_side, remote_ip).await.unwrap_err();
        assert!(matches!(err, ConnectionError::NoProtocolNoFallback));
    }
}
