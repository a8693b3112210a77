//! Dials a backend named by an `AddressUrl`: plain TCP, optionally
//! wrapped in a TLS client session with no certificate verification.

use muxy_core::AddressUrl;
use tokio::net::{TcpStream, UnixStream};
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::TlsConnector;

use crate::error::{ConnectionError, ConnectionResult};

/// A dialed backend stream: a bare TCP or Unix-domain socket, or either
/// one wrapped in a TLS client session.
pub enum BackendStream {
    Plain(TcpStream),
    PlainUnix(UnixStream),
    Tls(Box<TlsStream<TcpStream>>),
    TlsUnix(Box<TlsStream<UnixStream>>),
}

impl tokio::io::AsyncRead for BackendStream {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            BackendStream::Plain(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            BackendStream::PlainUnix(s) => std::pin::Pin::new(s).poll_read(cx, buf),
            BackendStream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_read(cx, buf),
            BackendStream::TlsUnix(s) => std::pin::Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl tokio::io::AsyncWrite for BackendStream {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        match self.get_mut() {
            BackendStream::Plain(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            BackendStream::PlainUnix(s) => std::pin::Pin::new(s).poll_write(cx, buf),
            BackendStream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_write(cx, buf),
            BackendStream::TlsUnix(s) => std::pin::Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            BackendStream::Plain(s) => std::pin::Pin::new(s).poll_flush(cx),
            BackendStream::PlainUnix(s) => std::pin::Pin::new(s).poll_flush(cx),
            BackendStream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_flush(cx),
            BackendStream::TlsUnix(s) => std::pin::Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        match self.get_mut() {
            BackendStream::Plain(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            BackendStream::PlainUnix(s) => std::pin::Pin::new(s).poll_shutdown(cx),
            BackendStream::Tls(s) => std::pin::Pin::new(s.as_mut()).poll_shutdown(cx),
            BackendStream::TlsUnix(s) => std::pin::Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Dial `backend`, setting `TCP_NODELAY` on success for TCP backends,
/// wrapping in TLS if `backend.tls` is set. `is_tcp()` addresses dial
/// over TCP; any other configured network kind is assumed to name a
/// Unix-domain socket path, per `spec.md` §4.4 step 4.
pub async fn dial(backend: &AddressUrl, tls_connector: &TlsConnector) -> ConnectionResult<BackendStream> {
    if backend.is_tcp() {
        let stream = TcpStream::connect(&backend.host)
            .await
            .map_err(|source| ConnectionError::Dial {
                address: backend.host.clone(),
                source,
            })?;
        let _ = stream.set_nodelay(true);

        if !backend.tls {
            return Ok(BackendStream::Plain(stream));
        }

        let host_only = backend
            .host
            .rsplit_once(':')
            .map(|(host, _port)| host)
            .unwrap_or(&backend.host);
        let server_name = tcp_server_name(backend, host_only)?;
        let tls_stream = tls_connector
            .connect(server_name, stream)
            .await
            .map_err(|source| ConnectionError::BackendTls {
                address: backend.host.clone(),
                source,
            })?;

        return Ok(BackendStream::Tls(Box::new(tls_stream)));
    }

    let stream = UnixStream::connect(&backend.host)
        .await
        .map_err(|source| ConnectionError::Dial {
            address: backend.host.clone(),
            source,
        })?;

    if !backend.tls {
        return Ok(BackendStream::PlainUnix(stream));
    }

    // A Unix socket path isn't a hostname; verification is disabled on
    // this connector regardless (see `muxy_config::tls`), so the name
    // only has to satisfy rustls's syntax check.
    let server_name = ServerName::try_from("localhost").expect("static server name is valid");
    let tls_stream = tls_connector
        .connect(server_name, stream)
        .await
        .map_err(|source| ConnectionError::BackendTls {
            address: backend.host.clone(),
            source,
        })?;

    Ok(BackendStream::TlsUnix(Box::new(tls_stream)))
}

fn tcp_server_name(backend: &AddressUrl, host_only: &str) -> ConnectionResult<ServerName<'static>> {
    ServerName::try_from(host_only.to_string()).map_err(|_| ConnectionError::BackendTls {
        address: backend.host.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid server name"),
    })
}
