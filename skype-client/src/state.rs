//! The session state machine.
//!
//! Pure: it consumes decoded [`Packet`]s and returns [`Action`]s for the
//! driver in [`crate::connection`] to carry out. It never touches a socket,
//! so every transition can be exercised with plain packets.
//!
//! ```text
//!  Idle ──begin──> Connecting ──CNT──> Authenticating ──ATH/BND──> Subscribing ──> Connected
//!                     │    ^                 │                                         │
//!                     │    └─────begin───────┤                                    disconnect
//!                     └──XFR──> Redirecting <┘                                         v
//!                                                                        Disconnecting ──> Closed
//! ```

use std::sync::Arc;

use skype_proto::xml::{self, Element};
use skype_proto::{Envelope, Message, MessageKind, Packet, Presence, Role, WireIdentity};

use crate::errors::{ClientError, ProtocolError};
use crate::requests;
use crate::resolver::{Entity, EntityResolver, Group, User};
use crate::transport::parse_target;
use crate::update::Event;

/// Where the session is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    Connecting,
    Redirecting,
    Authenticating,
    Subscribing,
    Connected,
    Disconnecting,
    Closed,
}

/// What the driver must do next, in order.
#[derive(Debug)]
pub enum Action {
    /// Write this packet.
    Send(Packet),
    /// Run the UIC handshake for this nonce, then call
    /// [`StateMachine::token_acquired`].
    AcquireToken { nonce: String },
    /// Replace the socket with one to `host:port`, then call
    /// [`StateMachine::begin`].
    Redirect { host: String, port: u16 },
    /// Release the caller waiting in `connect`.
    Connected,
    /// Publish an event.
    Emit(Event),
}

pub struct StateMachine {
    state:            State,
    username:         String,
    epid:             String,
    presence:         Presence,
    federation_token: Option<String>,
    resolver:         Arc<dyn EntityResolver>,
    /// `ATH` was acknowledged on the current socket.
    authenticated:    bool,
    /// `BND` was acknowledged on the current socket.
    bound:            bool,
}

impl StateMachine {
    pub fn new(
        username:         impl Into<String>,
        epid:             impl Into<String>,
        presence:         Presence,
        federation_token: Option<String>,
        resolver:         Arc<dyn EntityResolver>,
    ) -> Self {
        Self {
            state: State::Idle,
            username: username.into(),
            epid: epid.into(),
            presence,
            federation_token,
            resolver,
            authenticated: false,
            bound: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn epid(&self) -> &str {
        &self.epid
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    /// A fresh socket is open: start over with `CNT`.
    pub fn begin(&mut self) -> Vec<Action> {
        self.state = State::Connecting;
        self.authenticated = false;
        self.bound = false;
        vec![Action::Send(requests::connect())]
    }

    /// The UIC token for the pending nonce is ready.
    pub fn token_acquired(&mut self, uic: &str) -> Vec<Action> {
        vec![Action::Send(requests::authenticate(
            &self.username,
            uic,
            self.federation_token.as_deref(),
        ))]
    }

    /// The caller asked to disconnect.
    pub fn disconnect(&mut self) {
        if self.state != State::Closed {
            self.state = State::Disconnecting;
        }
    }

    /// The socket is gone for good.
    pub fn closed(&mut self) {
        self.state = State::Closed;
    }

    // ─── Inbound dispatch ─────────────────────────────────────────────────────

    /// Interpret one inbound packet.
    ///
    /// An error is fatal to the session.
    pub fn handle(&mut self, packet: &Packet) -> Result<Vec<Action>, ClientError> {
        match packet.command.as_str() {
            "CNT" => self.on_connect_reply(packet),
            "ATH" => Ok(self.on_authenticated()),
            "BND" => self.on_bound(packet),
            "GET" if packet.params == "MSGR" => Ok(self.on_document(packet)),
            "SDG" => self.on_message(packet),
            "NFY" => self.on_notification(packet),
            "XFR" => self.on_redirect(packet),
            "OUT" => Err(ProtocolError::SignedOut(packet.body_str().trim().to_string()).into()),
            "PNG" => Ok(self.mark_connected()),
            "PUT" | "GET" => Ok(Vec::new()),
            other => {
                tracing::debug!("[skype] ignoring unknown command {other} {}", packet.params);
                Ok(Vec::new())
            }
        }
    }

    fn on_connect_reply(&mut self, packet: &Packet) -> Result<Vec<Action>, ClientError> {
        if self.state != State::Connecting {
            tracing::debug!("[skype] CNT reply in state {:?}, ignoring", self.state);
            return Ok(Vec::new());
        }
        let doc = xml::parse(&packet.body_str())?;
        let nonce = doc.field("nonce")?.ok_or(ProtocolError::MissingField("nonce"))?;
        self.state = State::Authenticating;
        Ok(vec![Action::AcquireToken { nonce }])
    }

    fn on_authenticated(&mut self) -> Vec<Action> {
        if self.authenticated || self.state != State::Authenticating {
            tracing::debug!("[skype] duplicate ATH acknowledgment ignored");
            return Vec::new();
        }
        self.authenticated = true;
        vec![Action::Send(requests::bind(&self.epid))]
    }

    fn on_bound(&mut self, packet: &Packet) -> Result<Vec<Action>, ClientError> {
        if self.bound || !self.authenticated {
            tracing::debug!("[skype] BND acknowledgment ignored (bound={})", self.bound);
            return Ok(Vec::new());
        }
        self.bound = true;
        self.state = State::Subscribing;

        let body = packet.body_str();
        let nonce = match body.trim() {
            "" => None,
            text => xml::parse(text)?.field("nonce")?,
        };

        let mut actions = Vec::with_capacity(5);
        if let Some(nonce) = nonce {
            tracing::info!("[skype] server issued a legacy challenge");
            actions.push(Action::Send(requests::challenge_response(&nonce)));
        }
        actions.push(Action::Send(requests::publish_presence(&self.username, &self.epid, self.presence)));
        actions.push(Action::Send(requests::subscribe()));
        actions.push(Action::Send(requests::contacts(&self.resolver.contacts())));
        actions.push(Action::Send(requests::recent_conversations()));
        Ok(actions)
    }

    fn mark_connected(&mut self) -> Vec<Action> {
        if self.state != State::Subscribing {
            return Vec::new();
        }
        tracing::info!("[skype] session established");
        self.state = State::Connected;
        vec![Action::Connected]
    }

    /// `GET MSGR` responses. Bodies that do not parse are dropped.
    fn on_document(&mut self, packet: &Packet) -> Vec<Action> {
        let doc = match xml::parse(&packet.body_str()) {
            Ok(doc) => doc,
            Err(e) => {
                tracing::debug!("[skype] unparseable GET MSGR body: {e}");
                return Vec::new();
            }
        };
        match doc.name.as_str() {
            "recentconversations-response" => {
                let groups = self.joined_groups(&doc);
                if groups.is_empty() {
                    return self.mark_connected();
                }
                tracing::debug!("[skype] requesting details of {} threads", groups.len());
                vec![Action::Send(requests::threads(&groups)), Action::Send(requests::ping())]
            }
            "threads-response" => {
                let mut actions: Vec<_> = doc
                    .descendants("thread")
                    .into_iter()
                    .filter_map(|t| self.thread_state(t))
                    .map(Action::Emit)
                    .collect();
                actions.extend(self.mark_connected());
                actions
            }
            _ => Vec::new(),
        }
    }

    /// Groups we are still in, from a recent-conversations listing.
    fn joined_groups(&self, doc: &Element) -> Vec<Group> {
        doc.descendants("conversation")
            .into_iter()
            .filter(|c| {
                let Some(thread) = c.child("thread") else { return false };
                let left = thread.child("lastleaveat").is_some();
                let emptied = c.child("messages").is_some_and(|m| !m.has_children());
                !left && !emptied
            })
            .filter_map(|c| c.child("id"))
            .filter_map(|id| self.resolve(&id.text()))
            .filter_map(Entity::into_group)
            .collect()
    }

    /// `<thread>` with an id, a topic and a member list, as an event.
    fn thread_state(&self, thread: &Element) -> Option<Event> {
        let group = self.resolve(&thread.child("id")?.text())?.into_group()?;
        let topic = thread.child("properties")?.child("topic")?.text();
        let members = thread
            .child("members")?
            .elements()
            .filter(|m| m.name == "member")
            .filter_map(|m| {
                let user = self.resolve(&m.child("mri")?.text())?.into_user()?;
                let role = Role::parse(&m.child("role")?.text())?;
                Some((user, role))
            })
            .collect();
        Some(Event::ThreadUpdated { group, topic, members })
    }

    fn on_message(&mut self, packet: &Packet) -> Result<Vec<Action>, ClientError> {
        if packet.body.is_empty() {
            return Ok(Vec::new());
        }
        let env = Envelope::parse(&packet.body_str())?;
        let Some(kind) = env.message_type() else {
            return Ok(Vec::new());
        };
        let sender = self.resolve(&env.sender);

        let event = match kind.strip_prefix("ThreadActivity/") {
            Some(activity) => {
                let Some(group) = sender.and_then(Entity::into_group) else {
                    return Ok(Vec::new());
                };
                self.thread_activity(activity, group, &env.body)?
            }
            None => {
                let Some(sender) = sender.and_then(Entity::into_user) else {
                    return Ok(Vec::new());
                };
                match Message::from_envelope(&env) {
                    Some(Message { kind: MessageKind::Unknown(k), .. }) => {
                        tracing::trace!("[skype] ignoring message of type {k}");
                        None
                    }
                    Some(message) => Some(match self.resolve(&env.receiver) {
                        Some(Entity::Group(group)) => Event::GroupMessage { group, sender, message },
                        _ => Event::UserMessage { sender, message },
                    }),
                    None => None,
                }
            }
        };
        Ok(event.map(Action::Emit).into_iter().collect())
    }

    fn thread_activity(&self, activity: &str, group: Group, body: &str) -> Result<Option<Event>, ClientError> {
        let event = match activity {
            "AddMember" | "DeleteMember" => {
                let users: Vec<User> = xml::parse(body)?
                    .fields("target")
                    .iter()
                    .filter_map(|t| self.resolve(t))
                    .filter_map(Entity::into_user)
                    .collect();
                if users.is_empty() {
                    return Ok(None);
                }
                if activity == "AddMember" {
                    Event::UsersAdded { group, users }
                } else {
                    Event::UsersRemoved { group, users }
                }
            }
            "TopicUpdate" => {
                let Some(value) = xml::parse(body)?.field("value")? else {
                    return Ok(None);
                };
                Event::TopicChanged { group, topic: xml::plain_text(&value) }
            }
            "RoleUpdate" => {
                let doc = xml::parse(body)?;
                let roles = doc
                    .descendants("target")
                    .into_iter()
                    .filter_map(|t| {
                        let user = self.resolve(&t.child("id")?.text())?.into_user()?;
                        let role = Role::parse(&t.child("role")?.text())?;
                        Some((user, role))
                    })
                    .collect();
                Event::RolesChanged { group, roles }
            }
            other => {
                tracing::trace!("[skype] ignoring thread activity {other}");
                return Ok(None);
            }
        };
        Ok(Some(event))
    }

    fn on_notification(&mut self, packet: &Packet) -> Result<Vec<Action>, ClientError> {
        let event = match packet.params.as_str() {
            "MSGR\\DEL" => {
                let env = Envelope::parse(&packet.body_str())?;
                self.resolve(&env.sender)
                    .and_then(Entity::into_user)
                    .map(|user| Event::PresenceChanged { user, presence: Presence::Offline })
            }
            "MSGR\\PUT" => {
                let env = Envelope::parse(&packet.body_str())?;
                // A user going from offline to hidden publishes no status.
                let status = xml::parse(&env.body)
                    .ok()
                    .and_then(|doc| doc.field("Status").ok().flatten())
                    .unwrap_or_default();
                self.resolve(&env.sender)
                    .and_then(Entity::into_user)
                    .map(|user| Event::PresenceChanged { user, presence: Presence::from_status(&status) })
            }
            "MSGR\\THREAD" => {
                let doc = xml::parse(&packet.body_str())?;
                self.thread_state(&doc)
            }
            _ => None,
        };
        Ok(event.map(Action::Emit).into_iter().collect())
    }

    fn on_redirect(&mut self, packet: &Packet) -> Result<Vec<Action>, ClientError> {
        if matches!(self.state, State::Connected | State::Disconnecting | State::Closed) {
            tracing::warn!("[skype] XFR in state {:?} ignored", self.state);
            return Ok(Vec::new());
        }
        let target = xml::parse(&packet.body_str())?
            .field("target")?
            .ok_or(ProtocolError::MissingField("target"))?;
        let (host, port) = parse_target(&target).ok_or(ProtocolError::BadRedirect(target))?;
        tracing::info!("[skype] redirected to {host}:{port}");
        self.state = State::Redirecting;
        self.authenticated = false;
        self.bound = false;
        Ok(vec![Action::Redirect { host, port }])
    }

    fn resolve(&self, raw: &str) -> Option<Entity> {
        let id = WireIdentity::parse(raw).ok()?;
        self.resolver.resolve(&id)
    }
}
