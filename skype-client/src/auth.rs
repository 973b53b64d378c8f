//! Account credentials and federation token refresh.

use std::fmt;

use crate::errors::ClientError;
use crate::transport::BoxFuture;

/// How the account signs in.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A Skype username and password.
    Password { username: String, password: String },
    /// A Microsoft-account user signing in with a federation token.
    Federated { username: String, token: String },
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Password { username: username.into(), password: password.into() }
    }

    pub fn federated(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Federated { username: username.into(), token: token.into() }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Password { username, .. } | Self::Federated { username, .. } => username,
        }
    }

    /// The secret that goes into the login hash.
    pub fn secret(&self) -> &str {
        match self {
            Self::Password { password, .. } => password,
            Self::Federated { token, .. } => token,
        }
    }

    pub fn is_federated(&self) -> bool {
        matches!(self, Self::Federated { .. })
    }

    /// The token presented in `ATH`, for federated accounts.
    pub fn federation_token(&self) -> Option<&str> {
        match self {
            Self::Federated { token, .. } => Some(token),
            Self::Password { .. } => None,
        }
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::password("", "")
    }
}

// Secrets never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password { username, password } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &format_args!("<{} bytes>", password.len()))
                .finish(),
            Self::Federated { username, token } => f
                .debug_struct("Federated")
                .field("username", username)
                .field("token", &format_args!("<{} bytes>", token.len()))
                .finish(),
        }
    }
}

/// Source of fresh federation tokens, asked once per [`crate::Client::connect`].
pub trait TokenProvider: Send + Sync {
    fn fetch_token<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<String, ClientError>>;
}
