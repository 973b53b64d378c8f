//! Presence states and group roles as spelled on the wire.

use std::fmt;

/// A user's availability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Presence {
    /// Available (`NLN`).
    #[default]
    Online,
    /// Away / be right back (`AWY`).
    Away,
    /// Idle (`IDL`).
    Idle,
    /// Busy / do not disturb (`BSY`).
    Busy,
    /// Connected but invisible (`HDN`). Other users in this state are seen
    /// as [`Presence::Offline`].
    Hidden,
    /// Disconnected (empty status). Can be observed but never requested.
    Offline,
}

impl Presence {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online  => "NLN",
            Self::Away    => "AWY",
            Self::Idle    => "IDL",
            Self::Busy    => "BSY",
            Self::Hidden  => "HDN",
            Self::Offline => "",
        }
    }

    /// Case-insensitive parse; unknown or missing statuses mean offline.
    pub fn from_status(status: &str) -> Self {
        [Self::Online, Self::Away, Self::Idle, Self::Busy, Self::Hidden]
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(status.trim()))
            .unwrap_or(Self::Offline)
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("offline"),
            p => f.write_str(p.as_str()),
        }
    }
}

/// A member's role in a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// May add and remove members, change the topic and change roles.
    Admin,
    /// May add members, change the topic and leave.
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User  => "user",
        }
    }

    /// Case-insensitive parse.
    pub fn parse(raw: &str) -> Option<Self> {
        [Self::Admin, Self::User]
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_codes() {
        assert_eq!(Presence::from_status("NLN"), Presence::Online);
        assert_eq!(Presence::from_status("bsy"), Presence::Busy);
        assert_eq!(Presence::from_status(""), Presence::Offline);
        assert_eq!(Presence::from_status("???"), Presence::Offline);
        assert_eq!(Presence::Hidden.as_str(), "HDN");
    }

    #[test]
    fn roles() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("owner"), None);
    }
}
