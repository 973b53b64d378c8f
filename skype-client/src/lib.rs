//! # skype-client
//!
//! Async client for the Skype notification protocol.
//!
//! ## Features
//! - Password and federated (Microsoft account) sign-in
//! - Built-in UIC token handshake with login-server failover
//! - Transparent `XFR` redirects: sequence restarts, registration survives
//! - Keepalive pings on a cancellable monotonic timer
//! - Typed event stream: user and group messages, membership, topic and
//!   role changes, presence, thread state
//! - Outbound messages, group administration and presence changes
//! - Pluggable sockets ([`Connector`]), identity mapping ([`EntityResolver`])
//!   and token sources ([`TokenProvider`], [`Authenticator`])
//!
//! ```rust,no_run
//! use skype_client::{Client, Config, Credentials, Event};
//!
//! # async fn run() -> Result<(), skype_client::ClientError> {
//! let (client, mut events) = Client::connect(Config {
//!     credentials: Credentials::password("alice", "hunter2"),
//!     ..Default::default()
//! }).await?;
//!
//! while let Some(event) = events.next().await {
//!     if let Event::UserMessage { sender, message } = event {
//!         client.send_user_message(&sender, &message.text).await?;
//!     }
//! }
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

pub mod auth;
mod codec;
mod connection;
mod errors;
pub mod handshake;
mod keepalive;
mod requests;
pub mod resolver;
pub mod state;
pub mod transport;
pub mod update;

pub use auth::{Credentials, TokenProvider};
pub use errors::{ClientError, ProtocolError};
pub use handshake::{Authenticator, UicHandshake};
pub use resolver::{DefaultResolver, Entity, EntityResolver, Group, User};
pub use transport::{BoxFuture, BoxedSocket, Connector, Purpose, TlsConnector};
pub use update::{Event, EventStream};
pub use skype_proto::{Message, MessageKind, Presence, Role, WireIdentity};

use std::sync::Arc;
use std::time::Duration;

use skype_proto::Packet;
use tokio::io::BufReader;
use tokio::sync::{mpsc, oneshot};

use connection::{Receiver, Shared};
use keepalive::KeepAlive;
use state::StateMachine;

/// Default notification server.
pub const DEFAULT_SERVER_HOST: &str = "s.gateway.messenger.live.com";
pub const DEFAULT_SERVER_PORT: u16 = 443;

/// Default UIC login servers, tried in order.
pub const DEFAULT_UIC_ENDPOINTS: [(&str, u16); 2] = [("91.190.216.17", 33033), ("91.190.218.40", 33033)];

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`Client::connect`].
pub struct Config {
    pub credentials:        Credentials,
    pub server_host:        String,
    pub server_port:        u16,
    /// Login servers for the UIC handshake, in failover order.
    pub uic_endpoints:      Vec<(String, u16)>,
    /// Ping after this long without sending anything (default: 30 s).
    pub keepalive_interval: Duration,
    /// Upper bound on reaching the connected state, and on each redirect.
    pub connect_timeout:    Duration,
    /// Upper bound on one UIC handshake.
    pub uic_timeout:        Duration,
    /// Presence published on connect. Must not be [`Presence::Offline`].
    pub initial_presence:   Presence,
    /// Also send `PUT MSGR\ACTIVEENDPOINT` with every keepalive ping.
    pub active_endpoint_keepalive: bool,
    pub locale:             String,
    pub connector:          Arc<dyn Connector>,
    pub resolver:           Arc<dyn EntityResolver>,
    /// Asked for a fresh token before connecting a federated account.
    pub token_provider:     Option<Arc<dyn TokenProvider>>,
    /// Token source for `ATH`; `None` runs the built-in [`UicHandshake`].
    pub authenticator:      Option<Arc<dyn Authenticator>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials:        Credentials::default(),
            server_host:        DEFAULT_SERVER_HOST.to_string(),
            server_port:        DEFAULT_SERVER_PORT,
            uic_endpoints:      DEFAULT_UIC_ENDPOINTS.iter().map(|(h, p)| (h.to_string(), *p)).collect(),
            keepalive_interval: Duration::from_secs(30),
            connect_timeout:    Duration::from_secs(60),
            uic_timeout:        Duration::from_secs(15),
            initial_presence:   Presence::Online,
            active_endpoint_keepalive: false,
            locale:             skype_proto::uic::DEFAULT_LOCALE.to_string(),
            connector:          Arc::new(TlsConnector::new()),
            resolver:           Arc::new(DefaultResolver::new()),
            token_provider:     None,
            authenticator:      None,
        }
    }
}

// ─── Client ───────────────────────────────────────────────────────────────────

struct ClientInner {
    shared:   Arc<Shared>,
    username: String,
    epid:     String,
}

/// A connected session. Cheap to clone; all clones share the socket.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    // ── Connect ────────────────────────────────────────────────────────────

    /// Open a session and wait until it is fully established.
    ///
    /// Returns the client and the stream its events arrive on.
    pub async fn connect(config: Config) -> Result<(Self, EventStream), ClientError> {
        let Config {
            mut credentials,
            server_host,
            server_port,
            uic_endpoints,
            keepalive_interval,
            connect_timeout,
            uic_timeout,
            initial_presence,
            active_endpoint_keepalive,
            locale,
            connector,
            resolver,
            token_provider,
            authenticator,
        } = config;

        if credentials.username().is_empty() {
            return Err(ClientError::InvalidArgument("username is empty".into()));
        }
        if initial_presence == Presence::Offline {
            return Err(ClientError::InvalidArgument("initial presence cannot be offline".into()));
        }

        if let (true, Some(provider)) = (credentials.is_federated(), &token_provider) {
            let token = provider.fetch_token(credentials.username()).await?;
            tracing::debug!("[skype] federation token refreshed ({} bytes)", token.len());
            credentials = Credentials::federated(credentials.username(), token);
        }

        let username = credentials.username().to_string();
        let epid = uuid::Uuid::new_v4().to_string();
        let authenticator = authenticator.unwrap_or_else(|| {
            Arc::new(UicHandshake::new(uic_endpoints, connector.clone(), uic_timeout, locale))
        });

        tracing::info!("[skype] connecting to {server_host}:{server_port} as {username}");
        let socket = tokio::time::timeout(
            connect_timeout,
            connector.connect(&server_host, server_port, Purpose::Session),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;
        let (reader, writer) = tokio::io::split(socket);
        let shared = Arc::new(Shared::new(writer));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let machine = StateMachine::new(
            username.clone(),
            epid.clone(),
            initial_presence,
            credentials.federation_token().map(str::to_string),
            resolver,
        );
        let receiver = Receiver {
            shared: shared.clone(),
            reader: BufReader::new(reader),
            machine,
            connector,
            authenticator,
            credentials,
            connect_timeout,
            events: events_tx.clone(),
            ready: Some(ready_tx),
        };
        tokio::spawn(receiver.run());

        match tokio::time::timeout(connect_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(_)) => return Err(ClientError::NotConnected),
            Err(_) => {
                shared.request_disconnect();
                shared.cancel.cancel();
                shared.close().await;
                return Err(ClientError::Timeout);
            }
        }

        let keepalive = KeepAlive {
            shared: shared.clone(),
            interval: keepalive_interval,
            epid: active_endpoint_keepalive.then(|| epid.clone()),
            events: events_tx,
        };
        tokio::spawn(keepalive.run());

        tracing::info!("[skype] connected as {username} (epid {epid})");
        let client = Self { inner: Arc::new(ClientInner { shared, username, epid }) };
        Ok((client, EventStream { rx: events_rx }))
    }

    // ── Accessors ──────────────────────────────────────────────────────────

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    /// Endpoint id advertised for this session.
    pub fn epid(&self) -> &str {
        &self.inner.epid
    }

    /// `false` once the session failed or [`Client::disconnect`] was called.
    pub fn is_connected(&self) -> bool {
        !self.inner.shared.cancel.is_cancelled()
    }

    // ── Messaging ──────────────────────────────────────────────────────────

    pub async fn send_user_message(&self, user: &User, text: &str) -> Result<(), ClientError> {
        self.send(requests::message(self.username(), self.epid(), &user.wire(), text)).await
    }

    pub async fn send_group_message(&self, group: &Group, text: &str) -> Result<(), ClientError> {
        self.send(requests::message(self.username(), self.epid(), &group.wire(), text)).await
    }

    // ── Groups ─────────────────────────────────────────────────────────────

    pub async fn add_user_to_group(&self, user: &User, role: Role, group: &Group) -> Result<(), ClientError> {
        self.send(requests::add_member(group, user, role)).await
    }

    pub async fn change_user_role(&self, user: &User, role: Role, group: &Group) -> Result<(), ClientError> {
        self.send(requests::change_role(group, user, role)).await
    }

    pub async fn remove_user_from_group(&self, user: &User, group: &Group) -> Result<(), ClientError> {
        self.send(requests::remove_member(group, user)).await
    }

    pub async fn change_group_topic(&self, group: &Group, topic: &str) -> Result<(), ClientError> {
        self.send(requests::topic(group, topic)).await
    }

    // ── Presence ───────────────────────────────────────────────────────────

    /// Publish a new status. [`Presence::Offline`] is rejected; use
    /// [`Presence::Hidden`] or disconnect instead.
    pub async fn change_presence(&self, presence: Presence) -> Result<(), ClientError> {
        if presence == Presence::Offline {
            return Err(ClientError::InvalidArgument("cannot request offline presence".into()));
        }
        self.send(requests::change_presence(self.username(), self.epid(), presence)).await
    }

    // ── Disconnect ─────────────────────────────────────────────────────────

    /// Sign out and close the session. Safe to call more than once.
    pub async fn disconnect(&self) {
        let shared = &self.inner.shared;
        if !shared.request_disconnect() {
            return;
        }
        tracing::info!("[skype] disconnecting");
        if let Err(e) = shared.send(&requests::sign_out()).await {
            tracing::debug!("[skype] OUT not delivered: {e}");
        }
        shared.cancel.cancel();
        shared.close().await;
    }

    async fn send(&self, packet: Packet) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.inner.shared.send(&packet).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_bad_arguments_before_connecting() {
        let err = Client::connect(Config::default()).await.err().unwrap();
        assert!(matches!(err, ClientError::InvalidArgument(_)));

        let config = Config {
            credentials: Credentials::password("alice", "pw"),
            initial_presence: Presence::Offline,
            ..Default::default()
        };
        let err = Client::connect(config).await.err().unwrap();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server_host, "s.gateway.messenger.live.com");
        assert_eq!(config.server_port, 443);
        assert_eq!(config.uic_endpoints[0], ("91.190.216.17".to_string(), 33033));
        assert_eq!(config.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.initial_presence, Presence::Online);
        assert!(!config.active_endpoint_keepalive);
    }
}
