//! TLS connection setup (spec.md §4.4 "Construction", §6 "Wire protocol").
//!
//! Establishes the TCP + TLS transport and checks ALPN agreed on "h2"
//! before handing a plain `AsyncRead + AsyncWrite` stream to the rest of
//! the engine.

use crate::error::Http2Error;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use std::convert::TryFrom;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Peer verification is disabled by default, per spec.md §6, to allow
/// connecting to self-signed test servers. Implementers embedding this
/// engine in anything other than an interactive CLI SHOULD set
/// `verify_peer = true`.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub verify_peer: bool,
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_peer: false,
            alpn_protocols: vec![b"h2".to_vec(), b"h2-16".to_vec()],
        }
    }
}

struct NoVerifier;

impl rustls::client::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

fn build_rustls_config(config: &TlsConfig) -> ClientConfig {
    let mut root_store = RootCertStore::empty();
    root_store.add_server_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.0.iter().map(|ta| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(ta.subject, ta.spki, ta.name_constraints)
    }));
    let builder = ClientConfig::builder().with_safe_defaults();
    let mut tls_config = if config.verify_peer {
        builder.with_root_certificates(root_store).with_no_client_auth()
    } else {
        builder
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    };
    tls_config.alpn_protocols = config.alpn_protocols.clone();
    tls_config
}

/// Opens a TCP connection to `host:port` and negotiates TLS, returning the
/// stream once ALPN confirms the peer speaks HTTP/2.
pub async fn connect(host: &str, port: u16, config: &TlsConfig) -> Result<TlsStream<TcpStream>, Http2Error> {
    let tcp = TcpStream::connect((host, port)).await?;
    let connector = TlsConnector::from(Arc::new(build_rustls_config(config)));
    let server_name = rustls::ServerName::try_from(host)
        .map_err(|_| Http2Error::InvalidInput(format!("invalid host name: {host}")))?;
    let stream = connector.connect(server_name, tcp).await?;
    let (_, session) = stream.get_ref();
    match session.alpn_protocol() {
        Some(protocol) if config.alpn_protocols.iter().any(|p| p == protocol) => Ok(stream),
        _ => Err(Http2Error::AlpnMismatch),
    }
}
