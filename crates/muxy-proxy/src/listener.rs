//! The listener accept loop: binds, accepts, and spawns one connection
//! task per acceptance. Never awaits an individual connection.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use muxy_core::ListenerConfig;
use tokio::net::{TcpListener, UnixListener};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{info, warn};

use crate::connection::{self, ConnectionHandler};

/// Runs the accept loop for one listener until the process exits.
/// `tls_acceptor` is `None` for a plain-TCP listener. `listen_address`
/// selects the transport: a TCP listener when `is_tcp()`, a Unix
/// domain socket at its `host` path otherwise (`spec.md` §4.5 step 1).
pub async fn run(
    listener: Arc<ListenerConfig>,
    tls_acceptor: Option<TlsAcceptor>,
    tls_connector: TlsConnector,
) -> std::io::Result<()> {
    if listener.listen_address.is_tcp() {
        run_tcp(listener, tls_acceptor, tls_connector).await
    } else {
        run_unix(listener, tls_acceptor, tls_connector).await
    }
}

async fn run_tcp(
    listener: Arc<ListenerConfig>,
    tls_acceptor: Option<TlsAcceptor>,
    tls_connector: TlsConnector,
) -> std::io::Result<()> {
    let tcp_listener = TcpListener::bind(&listener.listen_address.host).await?;
    let tag = muxy_core::ids::tag(listener.id);
    info!(%tag, address = %listener.listen_address.encode(), "listener started");

    loop {
        let (stream, peer_addr) = match tcp_listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(%tag, error = %e, "accept error");
                continue;
            }
        };
        let _ = stream.set_nodelay(true);

        let remote_ip: IpAddr = peer_addr.ip();
        let listener = listener.clone();
        let tls_acceptor = tls_acceptor.clone();
        let tls_connector = tls_connector.clone();

        spawn_connection(listener, tls_acceptor, tls_connector, stream, remote_ip, peer_addr.to_string());
    }
}

/// Unix-domain sibling of [`run_tcp`]. There is no peer IP for a Unix
/// socket peer; `remote_ip` is seeded as unspecified and is only ever
/// overridden if a real-IP preamble is present on the wire.
async fn run_unix(
    listener: Arc<ListenerConfig>,
    tls_acceptor: Option<TlsAcceptor>,
    tls_connector: TlsConnector,
) -> std::io::Result<()> {
    let _ = std::fs::remove_file(&listener.listen_address.host);
    let unix_listener = UnixListener::bind(&listener.listen_address.host)?;
    let tag = muxy_core::ids::tag(listener.id);
    info!(%tag, address = %listener.listen_address.encode(), "listener started");

    let remote_ip = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

    loop {
        let (stream, _peer_addr) = match unix_listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(%tag, error = %e, "accept error");
                continue;
            }
        };

        let listener = listener.clone();
        let tls_acceptor = tls_acceptor.clone();
        let tls_connector = tls_connector.clone();

        spawn_connection(
            listener,
            tls_acceptor,
            tls_connector,
            stream,
            remote_ip,
            "unix socket".to_string(),
        );
    }
}

fn spawn_connection<S>(
    listener: Arc<ListenerConfig>,
    tls_acceptor: Option<TlsAcceptor>,
    tls_connector: TlsConnector,
    stream: S,
    remote_ip: IpAddr,
    peer_display: String,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let connection_id = muxy_core::ids::next_connection_id();

    tokio::spawn(async move {
        let conn_tag = muxy_core::ids::tag_conn(listener.id, connection_id);
        info!(tag = %conn_tag, peer = %peer_display, "connection accepted");

        let handler = ConnectionHandler {
            listener,
            tls_connector,
            connection_id,
        };

        let result = if let Some(acceptor) = tls_acceptor {
            match acceptor.accept(stream).await {
                Ok(tls_stream) => handler.handle(tls_stream, remote_ip).await,
                Err(e) => {
                    warn!(tag = %conn_tag, error = %e, "client TLS handshake failed");
                    return;
                }
            }
        } else {
            handler.handle(stream, remote_ip).await
        };

        if let Err(e) = result {
            connection::log_connection_error(&conn_tag, &e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxy_core::matcher::Target;
    use muxy_core::{AddressUrl, Matcher, ProtocolConfig};
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn accepts_and_routes_a_connection_end_to_end() {
        let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend_listener.local_addr().unwrap();
        let backend_task = tokio::spawn(async move {
            let (mut stream, _) = backend_listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });

        let protocols = ProtocolConfig::new(vec![Matcher::compile_string(
            "echo",
            Target::Raw,
            "PING",
        )]);
        let mut hosts = BTreeMap::new();
        hosts.insert("echo".to_string(), AddressUrl::parse(&format!("tcp://{backend_addr}")));

        // Bind ourselves first to learn the ephemeral port, then hand a
        // fresh listener with that exact address to `run`.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = probe.local_addr().unwrap();
        drop(probe);

        let listener_config = Arc::new(
            ListenerConfig::new(
                1,
                AddressUrl::parse(&format!("tcp://{proxy_addr}")),
                hosts,
                None,
                Duration::from_secs(2),
                &protocols,
            )
            .unwrap(),
        );

        let connector = muxy_config::tls::build_connector();
        tokio::spawn(run(listener_config, None, connector));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut client = tokio::net::TcpStream::connect(proxy_addr).await.unwrap();
        client.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");

        backend_task.await.unwrap();
    }

    #[tokio::test]
    async fn accepts_and_routes_a_connection_over_a_unix_socket() {
        let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend_listener.local_addr().unwrap();
        let backend_task = tokio::spawn(async move {
            let (mut stream, _) = backend_listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..n]).await.unwrap();
        });

        let protocols = ProtocolConfig::new(vec![Matcher::compile_string(
            "echo",
            Target::Raw,
            "PING",
        )]);
        let mut hosts = BTreeMap::new();
        hosts.insert("echo".to_string(), AddressUrl::parse(&format!("tcp://{backend_addr}")));

        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("proxy.sock");

        let listener_config = Arc::new(
            ListenerConfig::new(
                1,
                AddressUrl::parse(&format!("unix://{}", socket_path.display())),
                hosts,
                None,
                Duration::from_secs(2),
                &protocols,
            )
            .unwrap(),
        );

        let connector = muxy_config::tls::build_connector();
        tokio::spawn(run(listener_config, None, connector));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut client = tokio::net::UnixStream::connect(&socket_path).await.unwrap();
        client.write_all(b"PING").await.unwrap();
        let mut buf = [0u8; 4];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PING");

        backend_task.await.unwrap();
    }
}
