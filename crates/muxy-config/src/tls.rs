//! TLS materialization: turns on-disk certificate/key paths into
//! `rustls` server and client configurations.
//!
//! The listener side loads real certificate/key material and performs a
//! normal verified handshake. The backend-dial side never verifies the
//! upstream certificate: protocol discovery forwards whatever raw bytes
//! it classified, with no notion of which hostname the backend is
//! supposed to present, so there is nothing meaningful to check it
//! against.

use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::{ConfigError, ConfigResult};

/// One certificate/private-key pair as configured for a listener.
#[derive(Debug, Clone)]
pub struct CertKeyPair {
    pub certificate_path: String,
    pub private_key_path: String,
}

/// Build a `TlsAcceptor` from the first configured certificate/key pair.
///
/// Listener configuration allows a list of pairs for forward
/// compatibility with SNI-based virtual hosting, but nothing upstream
/// of this module resolves a hostname to a certificate yet, so only the
/// first pair is loaded; additional pairs are ignored with a warning.
pub fn build_acceptor(pairs: &[CertKeyPair]) -> ConfigResult<TlsAcceptor> {
    let pair = pairs.first().ok_or_else(|| ConfigError::TlsKeypair {
        cert_path: String::new(),
        key_path: String::new(),
        message: "no certificate/key pair configured".to_string(),
    })?;

    if pairs.len() > 1 {
        tracing::warn!(
            configured = pairs.len(),
            "listener has more than one TLS certificate configured; only the first is used"
        );
    }

    let certs = load_certs(&pair.certificate_path)?;
    let key = load_private_key(&pair.private_key_path)?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConfigError::TlsKeypair {
            cert_path: pair.certificate_path.clone(),
            key_path: pair.private_key_path.clone(),
            message: e.to_string(),
        })?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build a `TlsConnector` for dialing TLS backends.
///
/// Certificate verification is intentionally disabled: the address URL
/// names a protocol target, not a hostname whose identity the proxy can
/// meaningfully authenticate.
pub fn build_connector() -> TlsConnector {
    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .expect("ring provider supports the default TLS protocol versions")
    .dangerous()
    .with_custom_certificate_verifier(Arc::new(danger::NoVerifier))
    .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
}

fn load_certs(path: &str) -> ConfigResult<Vec<CertificateDer<'static>>> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::TlsKeypair {
            cert_path: path.to_string(),
            key_path: String::new(),
            message: format!("could not parse PEM certificate chain: {e}"),
        })
}

fn load_private_key(path: &str) -> ConfigResult<PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ConfigError::TlsKeypair {
            cert_path: String::new(),
            key_path: path.to_string(),
            message: format!("could not parse PEM private key: {e}"),
        })?
        .ok_or_else(|| ConfigError::TlsKeypair {
            cert_path: String::new(),
            key_path: path.to_string(),
            message: "no private key found in file".to_string(),
        })
}

/// Path to [`Path`] is accepted too, for callers that already hold one.
pub fn build_acceptor_from_paths(
    cert: impl AsRef<Path>,
    key: impl AsRef<Path>,
) -> ConfigResult<TlsAcceptor> {
    build_acceptor(&[CertKeyPair {
        certificate_path: cert.as_ref().display().to_string(),
        private_key_path: key.as_ref().display().to_string(),
    }])
}

mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error, SignatureScheme};

    /// Accepts any certificate presented by the backend. See the module
    /// doc comment for why this is the intended, non-test behavior here.
    #[derive(Debug)]
    pub struct NoVerifier;

    impl ServerCertVerifier for NoVerifier {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_self_signed() -> (tempfile::TempPath, tempfile::TempPath) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

        let mut cert_file = tempfile::NamedTempFile::new().unwrap();
        cert_file
            .write_all(cert.cert.pem().as_bytes())
            .unwrap();

        let mut key_file = tempfile::NamedTempFile::new().unwrap();
        key_file
            .write_all(cert.signing_key.serialize_pem().as_bytes())
            .unwrap();

        (cert_file.into_temp_path(), key_file.into_temp_path())
    }

    #[test]
    fn builds_an_acceptor_from_a_self_signed_keypair() {
        let (cert_path, key_path) = write_self_signed();
        build_acceptor_from_paths(&cert_path, &key_path).unwrap();
    }

    #[test]
    fn missing_certificate_file_is_a_tls_keypair_error() {
        let err =
            build_acceptor_from_paths("/nonexistent/cert.pem", "/nonexistent/key.pem")
                .unwrap_err();
        assert!(matches!(err, ConfigError::TlsKeypair { .. } | ConfigError::Io { .. }));
    }

    #[test]
    fn no_pairs_configured_is_a_tls_keypair_error() {
        let err = build_acceptor(&[]).unwrap_err();
        assert!(matches!(err, ConfigError::TlsKeypair { .. }));
    }

    #[test]
    fn build_connector_does_not_panic() {
        let _connector = build_connector();
    }
}
