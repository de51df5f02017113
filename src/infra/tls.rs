//! TLS client setup for relayed HTTPS calls.

use rustls_pki_types::ServerName;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::{client::TlsStream, TlsConnector};

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("Invalid server name: {0}")]
    InvalidServerName(String),

    #[error("TLS configuration error: {0}")]
    Config(String),

    #[error("TLS handshake failed: {0}")]
    Handshake(#[from] std::io::Error),
}

static TLS_CONFIG: OnceLock<Result<Arc<rustls::ClientConfig>, String>> = OnceLock::new();

/// Client configuration trusting Mozilla's root certificates, built once
/// and shared by every call.
///
/// The ring provider is selected explicitly so no process-wide default
/// provider needs to be installed first.
pub fn tls_config() -> Result<Arc<rustls::ClientConfig>, TlsError> {
    TLS_CONFIG
        .get_or_init(|| {
            let root_store =
                rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            let provider = Arc::new(rustls::crypto::ring::default_provider());

            rustls::ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()
                .map(|builder| {
                    Arc::new(
                        builder
                            .with_root_certificates(root_store)
                            .with_no_client_auth(),
                    )
                })
                .map_err(|e| e.to_string())
        })
        .clone()
        .map_err(TlsError::Config)
}

/// Performs the TLS handshake over an established TCP stream.
///
/// `host` may be a DNS name or an IP literal (brackets allowed).
pub async fn connect_tls(
    tcp_stream: TcpStream,
    host: &str,
) -> Result<TlsStream<TcpStream>, TlsError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let server_name = ServerName::try_from(bare.to_string())
        .map_err(|e| TlsError::InvalidServerName(format!("{}: {}", bare, e)))?;

    let connector = TlsConnector::from(tls_config()?);
    Ok(connector.connect(server_name, tcp_stream).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_is_shared() {
        let a = tls_config().unwrap();
        let b = tls_config().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_handshake_against_plain_tcp_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                use tokio::io::AsyncWriteExt;
                let _ = socket.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            }
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let err = connect_tls(stream, "127.0.0.1").await.unwrap_err();
        assert!(matches!(err, TlsError::Handshake(_)));
    }
}
