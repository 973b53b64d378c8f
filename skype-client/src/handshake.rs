//! Acquiring a UIC token over a dedicated socket.
//!
//! The byte-level steps live in [`skype_proto::uic`]; this module supplies
//! the socket, the endpoint failover and the timeout.

use std::sync::Arc;
use std::time::Duration;

use skype_proto::uic;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::errors::{ClientError, ProtocolError};
use crate::transport::{BoxFuture, BoxedSocket, Connector, Purpose};

/// Mints the token presented in `ATH` for a server nonce.
pub trait Authenticator: Send + Sync {
    fn uic_token<'a>(
        &'a self,
        username: &'a str,
        secret:   &'a str,
        nonce:    &'a str,
    ) -> BoxFuture<'a, Result<String, ClientError>>;
}

/// The built-in [`Authenticator`]: RSA key exchange and an AES-CTR encrypted
/// credential record against the login servers.
pub struct UicHandshake {
    endpoints: Vec<(String, u16)>,
    connector: Arc<dyn Connector>,
    timeout:   Duration,
    locale:    String,
}

impl UicHandshake {
    pub fn new(
        endpoints: Vec<(String, u16)>,
        connector: Arc<dyn Connector>,
        timeout:   Duration,
        locale:    impl Into<String>,
    ) -> Self {
        Self { endpoints, connector, timeout, locale: locale.into() }
    }

    async fn acquire(&self, username: &str, secret: &str, nonce: &str) -> Result<String, ClientError> {
        tokio::time::timeout(self.timeout, self.exchange(username, secret, nonce))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn exchange(&self, username: &str, secret: &str, nonce: &str) -> Result<String, ClientError> {
        let mut socket = self.hello().await?;

        let handshake = uic::Handshake::new()?;
        let mac = match mac_address::get_mac_address() {
            Ok(Some(mac)) => Some(mac.bytes()),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("[skype-uic] no MAC address ({e}), using a random hardware id");
                None
            }
        };
        let account = uic::Account {
            username,
            secret,
            hardware_id: uic::hardware_id(mac.as_ref().map(|m| &m[..]))?,
            locale: &self.locale,
        };

        socket.write_all(&handshake.key_exchange_frame()?).await?;
        socket.write_all(&handshake.credentials_frame(&account)?).await?;
        socket.flush().await?;

        let mut header = [0u8; 5];
        socket.read_exact(&mut header).await?;
        let mut payload = vec![0u8; uic::response_payload_len(header)?];
        socket.read_exact(&mut payload).await?;

        handshake.open_response(&mut payload);
        let token = handshake.finish(&payload, nonce)?;
        tracing::debug!("[skype-uic] token minted for {username}");
        Ok(token)
    }

    /// Try every endpoint in order until one answers the hello.
    async fn hello(&self) -> Result<BoxedSocket, ClientError> {
        for (host, port) in &self.endpoints {
            match self.try_hello(host, *port).await {
                Ok(socket) => return Ok(socket),
                Err(e) => tracing::warn!("[skype-uic] {host}:{port} failed: {e}"),
            }
        }
        Err(ProtocolError::Handshake("no login server responded".into()).into())
    }

    async fn try_hello(&self, host: &str, port: u16) -> Result<BoxedSocket, ClientError> {
        let mut socket = self.connector.connect(host, port, Purpose::Handshake).await?;
        socket.write_all(&uic::hello()).await?;
        socket.flush().await?;
        let mut reply = [0u8; 5];
        socket.read_exact(&mut reply).await?;
        uic::check_hello([reply[0], reply[1], reply[2]])?;
        Ok(socket)
    }
}

impl Authenticator for UicHandshake {
    fn uic_token<'a>(
        &'a self,
        username: &'a str,
        secret:   &'a str,
        nonce:    &'a str,
    ) -> BoxFuture<'a, Result<String, ClientError>> {
        Box::pin(self.acquire(username, secret, nonce))
    }
}

impl std::fmt::Debug for UicHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UicHandshake")
            .field("endpoints", &self.endpoints)
            .field("timeout", &self.timeout)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use tokio::io::DuplexStream;

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")
    }

    /// Refuses every host except `good`, whose server half is handed to the test.
    struct OneHost {
        good:   &'static str,
        server: Mutex<Option<DuplexStream>>,
        tried:  Mutex<Vec<String>>,
    }

    impl OneHost {
        fn new(good: &'static str) -> (Arc<Self>, DuplexStream) {
            let (client, server) = tokio::io::duplex(8192);
            let this = Arc::new(Self {
                good,
                server: Mutex::new(Some(client)),
                tried: Mutex::new(Vec::new()),
            });
            (this, server)
        }
    }

    impl Connector for OneHost {
        fn connect<'a>(&'a self, host: &'a str, _port: u16, purpose: Purpose)
            -> BoxFuture<'a, io::Result<BoxedSocket>>
        {
            assert_eq!(purpose, Purpose::Handshake);
            self.tried.lock().unwrap().push(host.to_string());
            let socket = if host == self.good { self.server.lock().unwrap().take() } else { None };
            Box::pin(async move {
                let socket = socket.ok_or_else(refused)?;
                Ok(Box::new(socket) as BoxedSocket)
            })
        }
    }

    fn endpoints() -> Vec<(String, u16)> {
        vec![("a".into(), 33033), ("b".into(), 33033)]
    }

    #[tokio::test]
    async fn fails_over_to_the_next_endpoint() {
        let (connector, mut server) = OneHost::new("b");
        let handshake = UicHandshake::new(endpoints(), connector.clone(), Duration::from_secs(60), "en");

        let script = tokio::spawn(async move {
            let mut hello = [0u8; 5];
            server.read_exact(&mut hello).await.unwrap();
            assert_eq!(hello, uic::hello());
            server.write_all(&[0x17, 0x03, 0x01, 0x00, 0x00]).await.unwrap();

            let mut exchange = [0u8; 5];
            server.read_exact(&mut exchange).await.unwrap();
            assert_eq!(&exchange[..3], &uic::HELLO_MAGIC);
            // A reply too short to hold its checksum.
            server.write_all(&[0x17, 0x03, 0x01, 0x00, 0x01]).await.unwrap();
            server
        });

        let err = handshake.uic_token("alice", "pw", "nonce").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Handshake(ref m)) if m.contains("too short")));
        assert_eq!(*connector.tried.lock().unwrap(), ["a", "b"]);
        script.await.unwrap();
    }

    #[tokio::test]
    async fn bad_hello_reply_exhausts_endpoints() {
        let (connector, mut server) = OneHost::new("a");
        let handshake = UicHandshake::new(endpoints(), connector.clone(), Duration::from_secs(60), "en");

        tokio::spawn(async move {
            let mut hello = [0u8; 5];
            server.read_exact(&mut hello).await.unwrap();
            server.write_all(&[0x15, 0x03, 0x01, 0x00, 0x00]).await.unwrap();
            let _ = server.read(&mut hello).await;
        });

        let err = handshake.uic_token("alice", "pw", "nonce").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Handshake(ref m)) if m.contains("no login server")));
        assert_eq!(*connector.tried.lock().unwrap(), ["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out() {
        let (connector, _server) = OneHost::new("a");
        let handshake = UicHandshake::new(endpoints(), connector, Duration::from_secs(15), "en");
        let err = handshake.uic_token("alice", "pw", "nonce").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
    }
}
