//! Error types for skype-client.

use std::{fmt, io};

use skype_proto::{envelope, packet, uic, xml};

// ─── ProtocolError ────────────────────────────────────────────────────────────

/// The server said something the client cannot continue from.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolError {
    /// A numeric status line other than the benign one.
    ServerError { code: String, params: String, payload: String },
    /// The login server refused the credentials.
    LoginRejected { code: u32 },
    /// A required field was absent from a server document.
    MissingField(&'static str),
    /// An `XFR` target that is not `host:port`.
    BadRedirect(String),
    /// The server closed the session with `OUT`.
    SignedOut(String),
    /// A body that should be XML is not.
    Xml(xml::Error),
    /// The UIC exchange went wrong below the credential layer.
    Handshake(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerError { code, params, payload }
                                     => write!(f, "server error {code} on {params}: {payload}"),
            Self::LoginRejected { code } => write!(f, "login rejected (status {code})"),
            Self::MissingField(name) => write!(f, "missing <{name}> in server document"),
            Self::BadRedirect(t)     => write!(f, "unroutable redirect target {t:?}"),
            Self::SignedOut(reason)  => write!(f, "signed out by server: {reason}"),
            Self::Xml(e)             => write!(f, "{e}"),
            Self::Handshake(e)       => write!(f, "UIC handshake failed: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

// ─── ClientError ──────────────────────────────────────────────────────────────

/// The error type returned from any [`crate::Client`] method.
#[derive(Debug)]
pub enum ClientError {
    /// Malformed packet line, short payload or broken envelope.
    Framing(String),
    /// See [`ProtocolError`].
    Protocol(ProtocolError),
    /// A cryptographic primitive failed during the UIC handshake.
    Security(skype_crypto::Error),
    /// Socket I/O failure.
    Transport(io::Error),
    /// The caller asked for something the protocol does not allow.
    InvalidArgument(String),
    /// The session is closed.
    NotConnected,
    /// The operation did not finish in time.
    Timeout,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framing(e)         => write!(f, "framing error: {e}"),
            Self::Protocol(e)        => write!(f, "protocol error: {e}"),
            Self::Security(e)        => write!(f, "security error: {e}"),
            Self::Transport(e)       => write!(f, "transport error: {e}"),
            Self::InvalidArgument(e) => write!(f, "invalid argument: {e}"),
            Self::NotConnected       => write!(f, "not connected"),
            Self::Timeout            => write!(f, "timed out"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Protocol(e)  => Some(e),
            Self::Security(e)  => Some(e),
            Self::Transport(e) => Some(e),
            _                  => None,
        }
    }
}

impl ClientError {
    /// Whether the error tears the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Framing(_) | Self::Protocol(_) | Self::Security(_) | Self::Transport(_))
    }

    pub(crate) fn eof() -> Self {
        Self::Transport(io::Error::new(io::ErrorKind::UnexpectedEof, "server closed the connection"))
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self { Self::Transport(e) }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self { Self::Protocol(e) }
}

impl From<skype_crypto::Error> for ClientError {
    fn from(e: skype_crypto::Error) -> Self { Self::Security(e) }
}

impl From<packet::Error> for ClientError {
    fn from(e: packet::Error) -> Self {
        match e {
            packet::Error::ServerError { code, params, payload } =>
                Self::Protocol(ProtocolError::ServerError { code, params, payload }),
            other => Self::Framing(other.to_string()),
        }
    }
}

impl From<envelope::ParseError> for ClientError {
    fn from(e: envelope::ParseError) -> Self { Self::Framing(e.to_string()) }
}

impl From<xml::Error> for ClientError {
    fn from(e: xml::Error) -> Self { Self::Protocol(ProtocolError::Xml(e)) }
}

impl From<uic::Error> for ClientError {
    fn from(e: uic::Error) -> Self {
        match e {
            uic::Error::Crypto(e)              => Self::Security(e),
            uic::Error::LoginRejected { code } => Self::Protocol(ProtocolError::LoginRejected { code }),
            uic::Error::MissingCredentials     => Self::Protocol(ProtocolError::MissingField("signed credentials")),
            other                              => Self::Protocol(ProtocolError::Handshake(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_status_maps_to_protocol() {
        let e: ClientError = packet::Error::ServerError {
            code: "911".into(), params: "CON".into(), payload: String::new(),
        }.into();
        assert!(matches!(e, ClientError::Protocol(ProtocolError::ServerError { ref code, .. }) if code == "911"));
        assert!(e.is_fatal());

        let e: ClientError = packet::Error::BareCarriageReturn.into();
        assert!(matches!(e, ClientError::Framing(_)));
    }

    #[test]
    fn uic_errors_map_by_kind() {
        let e: ClientError = uic::Error::Crypto(skype_crypto::Error::InvalidKey).into();
        assert!(matches!(e, ClientError::Security(_)));
        let e: ClientError = uic::Error::LoginRejected { code: 4100 }.into();
        assert!(matches!(e, ClientError::Protocol(ProtocolError::LoginRejected { code: 4100 })));
        let e: ClientError = uic::Error::MissingCredentials.into();
        assert!(matches!(e, ClientError::Protocol(ProtocolError::MissingField(_))));
    }

    #[test]
    fn caller_errors_are_not_fatal() {
        assert!(!ClientError::NotConnected.is_fatal());
        assert!(!ClientError::InvalidArgument("x".into()).is_fatal());
        assert!(!ClientError::Timeout.is_fatal());
        assert!(ClientError::eof().is_fatal());
    }
}
