//! Events delivered through [`crate::EventStream`].
//!
//! Every inbound `SDG` or `NFY` the session understands becomes one
//! [`Event`], with its wire identities already mapped through the
//! configured [`crate::EntityResolver`].

use skype_proto::{Message, Presence, Role};
use tokio::sync::mpsc;

use crate::errors::ClientError;
use crate::resolver::{Group, User};

// ─── Event ────────────────────────────────────────────────────────────────────

/// Something happened on the session.
#[derive(Debug)]
#[non_exhaustive]
pub enum Event {
    /// A one-to-one message.
    UserMessage { sender: User, message: Message },
    /// A message posted to a group.
    GroupMessage { group: Group, sender: User, message: Message },
    /// Members joined a group.
    UsersAdded { group: Group, users: Vec<User> },
    /// Members left or were removed from a group.
    UsersRemoved { group: Group, users: Vec<User> },
    /// A group's topic changed.
    TopicChanged { group: Group, topic: String },
    /// Members' roles in a group changed.
    RolesChanged { group: Group, roles: Vec<(User, Role)> },
    /// A user's presence changed.
    PresenceChanged { user: User, presence: Presence },
    /// Full state of a group: its topic and members with their roles.
    ThreadUpdated { group: Group, topic: String, members: Vec<(User, Role)> },
    /// The session failed after `connect` returned. Nothing follows.
    Error(ClientError),
}

impl Event {
    /// The group this event concerns, if any.
    pub fn group(&self) -> Option<&Group> {
        match self {
            Self::GroupMessage { group, .. }
            | Self::UsersAdded { group, .. }
            | Self::UsersRemoved { group, .. }
            | Self::TopicChanged { group, .. }
            | Self::RolesChanged { group, .. }
            | Self::ThreadUpdated { group, .. } => Some(group),
            _ => None,
        }
    }
}

// ─── EventStream ──────────────────────────────────────────────────────────────

/// Asynchronous stream of [`Event`]s.
pub struct EventStream {
    pub(crate) rx: mpsc::UnboundedReceiver<Event>,
}

impl EventStream {
    /// Wait for the next event. Returns `None` once the session is gone.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
