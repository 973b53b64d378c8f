//! Wire identities (MRIs): `<network>:<name>[@domain|;suffix]`.

use std::fmt;

/// Network code of a Skype user.
pub const NETWORK_USER: u32 = 8;
/// Network code of a group thread.
pub const NETWORK_GROUP: u32 = 19;

/// Domain appended to group thread identities.
pub const THREAD_DOMAIN: &str = "thread.skype";

/// What an identity points at, judged by its network code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Group,
}

/// Failure to parse a [`WireIdentity`].
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed wire identity: {:?}", self.0)
    }
}

impl std::error::Error for ParseError {}

/// A network code and a bare name, with any `@domain` or `;suffix` dropped.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WireIdentity {
    pub network: u32,
    pub name: String,
}

impl WireIdentity {
    pub fn user(name: impl Into<String>) -> Self {
        Self { network: NETWORK_USER, name: name.into() }
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self { network: NETWORK_GROUP, name: id.into() }
    }

    /// Parse `8:alice`, `8:alice;epid={…}`, `19:abc@thread.skype`, …
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let bad = || ParseError(raw.to_string());
        let (network, rest) = raw.trim().split_once(':').ok_or_else(bad)?;
        if network.is_empty() || !network.bytes().all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let network = network.parse().map_err(|_| bad())?;
        let end = rest.find(['@', ';']).unwrap_or(rest.len());
        Ok(Self { network, name: rest[..end].to_string() })
    }

    /// `None` for networks the client does not route.
    pub fn kind(&self) -> Option<EntityKind> {
        match self.network {
            NETWORK_USER  => Some(EntityKind::User),
            NETWORK_GROUP => Some(EntityKind::Group),
            _             => None,
        }
    }
}

/// Canonical wire form: groups carry the thread domain.
impl fmt::Display for WireIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.network {
            NETWORK_GROUP => write!(f, "{}:{}@{}", self.network, self.name, THREAD_DOMAIN),
            n             => write!(f, "{}:{}", n, self.name),
        }
    }
}

impl std::str::FromStr for WireIdentity {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(s) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(WireIdentity::parse("8:alice").unwrap(), WireIdentity::user("alice"));
        assert_eq!(WireIdentity::parse("8:alice;epid={1234}").unwrap(), WireIdentity::user("alice"));
        assert_eq!(WireIdentity::parse("19:abc@thread.skype").unwrap(), WireIdentity::group("abc"));
        assert_eq!(WireIdentity::parse("19:abc;x@y").unwrap().name, "abc");
        let live = WireIdentity::parse("4:+15551234").unwrap();
        assert_eq!((live.network, live.kind()), (4, None));
    }

    #[test]
    fn parse_rejects() {
        for bad in ["alice", ":alice", "x8:alice", "99999999999:a"] {
            assert!(WireIdentity::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn display_is_canonical() {
        assert_eq!(WireIdentity::user("bob").to_string(), "8:bob");
        assert_eq!(WireIdentity::group("abc").to_string(), "19:abc@thread.skype");
        let id: WireIdentity = "19:abc@thread.skype".parse().unwrap();
        assert_eq!(id.to_string(), "19:abc@thread.skype");
    }
}
