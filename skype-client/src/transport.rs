//! Sockets for the session and for the UIC handshake.
//!
//! Every connection the client opens goes through a [`Connector`], so tests
//! (and callers behind proxies) can hand out their own streams. The default
//! [`TlsConnector`] speaks TLS to the notification server and raw TCP to
//! the UIC login servers.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::rustls;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Any bidirectional byte stream.
pub trait Socket: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Socket for T {}

pub type BoxedSocket = Box<dyn Socket>;

/// What a socket will be used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    /// The long-lived notification session (including redirect targets).
    Session,
    /// A short-lived UIC handshake socket.
    Handshake,
}

/// Opens sockets on behalf of the client.
pub trait Connector: Send + Sync {
    fn connect<'a>(&'a self, host: &'a str, port: u16, purpose: Purpose)
        -> BoxFuture<'a, io::Result<BoxedSocket>>;
}

// ─── TlsConnector ─────────────────────────────────────────────────────────────

/// TCP with `TCP_NODELAY`; session sockets are wrapped in TLS checked against
/// the webpki root store.
#[derive(Clone)]
pub struct TlsConnector {
    tls: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    pub fn new() -> Self {
        Self { tls: tokio_rustls::TlsConnector::from(Arc::new(default_tls_config())) }
    }

    async fn open(&self, host: &str, port: u16, purpose: Purpose) -> io::Result<BoxedSocket> {
        let tcp = TcpStream::connect((host, port)).await?;
        tcp.set_nodelay(true)?;
        match purpose {
            Purpose::Handshake => Ok(Box::new(tcp)),
            Purpose::Session => {
                let name = rustls::pki_types::ServerName::try_from(host.to_string())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                let stream = self.tls.connect(name, tcp).await?;
                tracing::debug!("[skype] TLS established with {host}:{port}");
                Ok(Box::new(stream))
            }
        }
    }
}

impl Default for TlsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TlsConnector {
    fn connect<'a>(&'a self, host: &'a str, port: u16, purpose: Purpose)
        -> BoxFuture<'a, io::Result<BoxedSocket>>
    {
        Box::pin(self.open(host, port, purpose))
    }
}

fn default_tls_config() -> rustls::ClientConfig {
    // Several providers may be compiled in; pick ring explicitly.
    let _ = rustls::crypto::ring::default_provider().install_default();
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Split `host:port`, accepting only `[A-Za-z0-9.]+:\d+`.
pub fn parse_target(target: &str) -> Option<(String, u16)> {
    let (host, port) = target.trim().split_once(':')?;
    let host_ok = !host.is_empty() && host.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'.');
    let port_ok = !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit());
    if !host_ok || !port_ok {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_targets() {
        assert_eq!(parse_target("host.example.com:1234"), Some(("host.example.com".into(), 1234)));
        assert_eq!(parse_target(" 10.0.0.1:443 "), Some(("10.0.0.1".into(), 443)));
        for bad in ["host", "host:", ":80", "ho-st:80", "host:80x", "host:99999", "a:b:1"] {
            assert_eq!(parse_target(bad), None, "{bad}");
        }
    }
}
