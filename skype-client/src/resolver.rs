//! Mapping from wire identities to the caller's users and groups.
//!
//! The client never keeps a directory of its own: every identity it reads
//! off the wire goes through an [`EntityResolver`], and whatever that
//! returns is what ends up in [`crate::Event`]s. Identities the resolver
//! declines are skipped, never reported as errors.

use std::fmt;

use skype_proto::{EntityKind, WireIdentity};

// ─── Handles ──────────────────────────────────────────────────────────────────

/// A Skype user, by username.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self { username: username.into() }
    }

    pub fn wire(&self) -> WireIdentity {
        WireIdentity::user(self.username.clone())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// A group conversation, by thread id (without network code or domain).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Group {
    pub id: String,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn wire(&self) -> WireIdentity {
        WireIdentity::group(self.id.clone())
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// What a wire identity resolved to.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
    User(User),
    Group(Group),
}

impl Entity {
    pub fn into_user(self) -> Option<User> {
        match self {
            Self::User(u) => Some(u),
            Self::Group(_) => None,
        }
    }

    pub fn into_group(self) -> Option<Group> {
        match self {
            Self::Group(g) => Some(g),
            Self::User(_) => None,
        }
    }
}

// ─── EntityResolver ───────────────────────────────────────────────────────────

/// The caller's side of the identity boundary.
pub trait EntityResolver: Send + Sync {
    /// Map an identity to a handle. `None` means "ignore this identity".
    fn resolve(&self, id: &WireIdentity) -> Option<Entity>;

    /// Contacts announced to the server when the session binds.
    fn contacts(&self) -> Vec<User> {
        Vec::new()
    }
}

/// Resolves network 8 to users and network 19 to groups; ignores the rest.
#[derive(Clone, Debug, Default)]
pub struct DefaultResolver {
    contacts: Vec<User>,
}

impl DefaultResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce these contacts on bind.
    pub fn with_contacts(contacts: impl IntoIterator<Item = User>) -> Self {
        Self { contacts: contacts.into_iter().collect() }
    }
}

impl EntityResolver for DefaultResolver {
    fn resolve(&self, id: &WireIdentity) -> Option<Entity> {
        match id.kind()? {
            EntityKind::User  => Some(Entity::User(User::new(id.name.clone()))),
            EntityKind::Group => Some(Entity::Group(Group::new(id.name.clone()))),
        }
    }

    fn contacts(&self) -> Vec<User> {
        self.contacts.clone()
    }
}
