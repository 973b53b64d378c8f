//! Text packet framing.
//!
//! ```text
//! COMMAND SEQ PARAMS BYTELEN\r\n
//! (Header-Key: value\r\n)*
//! \r\n
//! body
//! ```
//!
//! `BYTELEN` counts everything after the first line: header lines, the blank
//! line and the body.

use std::borrow::Cow;
use std::fmt;

/// Numeric status that is a harmless race on the server side and is skipped.
pub const BENIGN_ERROR_CODE: &str = "715";

/// Upper bound on a declared payload length.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

// ─── Error ────────────────────────────────────────────────────────────────────

/// Errors produced while framing or unframing packets.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The first line does not match `COMMAND SEQ PARAMS BYTELEN`.
    MalformedLine(String),
    /// A `\r` was not followed by `\n`.
    BareCarriageReturn,
    /// The stream ended before the declared payload was read.
    Truncated { expected: usize, got: usize },
    /// The declared payload length exceeds [`MAX_PAYLOAD_LEN`].
    TooLarge { len: usize },
    /// The payload header block is not terminated by a blank line.
    MalformedPayload,
    /// The server answered with a numeric error code.
    ServerError { code: String, params: String, payload: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedLine(l)           => write!(f, "malformed packet line: {l:?}"),
            Self::BareCarriageReturn         => write!(f, "bare carriage return in packet line"),
            Self::Truncated { expected, got } => write!(f, "payload truncated: got {got} of {expected} bytes"),
            Self::TooLarge { len }           => write!(f, "declared payload of {len} bytes is too large"),
            Self::MalformedPayload           => write!(f, "payload headers not terminated by a blank line"),
            Self::ServerError { code, params, payload }
                => write!(f, "server error {code} ({params}): {payload}"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Whether this is a server-reported status rather than a framing fault.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ServerError { .. })
    }
}

// ─── Packet ───────────────────────────────────────────────────────────────────

/// A decoded packet, stripped of sequence number and payload headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub command: String,
    pub params:  String,
    pub body:    Vec<u8>,
}

impl Packet {
    pub fn new(command: impl Into<String>, params: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self { command: command.into(), params: params.into(), body: body.into() }
    }

    /// The body as text, replacing invalid UTF-8.
    pub fn body_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

// ─── Header line ──────────────────────────────────────────────────────────────

/// The parsed first line of a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub command: String,
    pub seq:     u32,
    pub params:  String,
    pub len:     usize,
}

impl Header {
    /// Parse `COMMAND SEQ PARAMS BYTELEN` (without the line terminator).
    ///
    /// `COMMAND` is upper-case letters or digits, `PARAMS` is upper-case
    /// letters optionally followed by `\` and more upper-case letters.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let bad = || Error::MalformedLine(line.to_string());

        let mut parts = line.split(' ');
        let (Some(command), Some(seq), Some(params), Some(len), None) =
            (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(bad());
        };

        let is_upper = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_uppercase());
        let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

        if !is_upper(command) && !is_digits(command) {
            return Err(bad());
        }
        let params_ok = match params.split_once('\\') {
            Some((head, tail)) => is_upper(head) && is_upper(tail),
            None => is_upper(params),
        };
        if !params_ok || !is_digits(seq) || !is_digits(len) {
            return Err(bad());
        }

        let seq = seq.parse().map_err(|_| bad())?;
        let len = len.parse().map_err(|_| bad())?;
        if len > MAX_PAYLOAD_LEN {
            return Err(Error::TooLarge { len });
        }
        Ok(Self { command: command.to_string(), seq, params: params.to_string(), len })
    }

    /// All-digit commands are server error codes.
    pub fn is_error_code(&self) -> bool {
        self.command.bytes().all(|b| b.is_ascii_digit())
    }

    /// The one error code that is skipped instead of surfaced.
    pub fn is_benign(&self) -> bool {
        self.command == BENIGN_ERROR_CODE
    }
}

/// Remove the `\r\n` or `\n` terminator from a raw line.
///
/// Any other `\r` in the line is a framing error.
pub fn strip_line_ending(line: &[u8]) -> Result<&[u8], Error> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.contains(&b'\r') {
        return Err(Error::BareCarriageReturn);
    }
    Ok(line)
}

// ─── Frame ────────────────────────────────────────────────────────────────────

/// A header line together with its raw, unsplit payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header:  Header,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Take one frame off the front of `buf`.
    ///
    /// Returns the frame and the number of bytes consumed, or `Ok(None)` if
    /// `buf` does not yet hold a complete frame.
    pub fn decode(buf: &[u8]) -> Result<Option<(Self, usize)>, Error> {
        let Some(nl) = buf.iter().position(|&b| b == b'\n') else {
            // A `\r` that is not the last byte can never become `\r\n`.
            if let Some(cr) = buf.iter().position(|&b| b == b'\r') {
                if cr + 1 < buf.len() {
                    return Err(Error::BareCarriageReturn);
                }
            }
            return Ok(None);
        };

        let line = strip_line_ending(&buf[..=nl])?;
        let header = Header::parse(&String::from_utf8_lossy(line))?;
        let start = nl + 1;
        let end = start + header.len;
        if buf.len() < end {
            return Ok(None);
        }
        let payload = buf[start..end].to_vec();
        Ok(Some((Self { header, payload }, end)))
    }

    /// Split the payload headers from the body.
    ///
    /// Returns the packet and the value of a `Set-Registration` header, if any.
    pub fn into_packet(self) -> Result<(Packet, Option<String>), Error> {
        let Payload { registration, body } = split_payload(&self.payload)?;
        let packet = Packet { command: self.header.command, params: self.header.params, body };
        Ok((packet, registration))
    }

    /// Turn a numeric-status frame into the matching error.
    pub fn into_server_error(self) -> Error {
        Error::ServerError {
            code:    self.header.command,
            params:  self.header.params,
            payload: String::from_utf8_lossy(&self.payload).into_owned(),
        }
    }
}

// ─── Payload ──────────────────────────────────────────────────────────────────

/// A payload split into its header block and body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    pub registration: Option<String>,
    pub body:         Vec<u8>,
}

/// Consume `Key: Value` lines up to the blank line; the rest is the body.
///
/// An empty payload is an empty body.
pub fn split_payload(raw: &[u8]) -> Result<Payload, Error> {
    if raw.is_empty() {
        return Ok(Payload { registration: None, body: Vec::new() });
    }

    let mut registration = None;
    let mut pos = 0;
    loop {
        let nl = raw[pos..].iter().position(|&b| b == b'\n').ok_or(Error::MalformedPayload)?;
        let line = &raw[pos..pos + nl];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        pos += nl + 1;

        if line.is_empty() {
            return Ok(Payload { registration, body: raw[pos..].to_vec() });
        }

        let (key, value) = split_header(line).ok_or(Error::MalformedPayload)?;
        if key == "Set-Registration" {
            registration = Some(value);
        }
    }
}

fn split_header(line: &[u8]) -> Option<(String, String)> {
    let line = std::str::from_utf8(line).ok()?;
    let (key, value) = line.split_once(": ")?;
    let key_ok = !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-');
    if !key_ok || value.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

// ─── Encode ───────────────────────────────────────────────────────────────────

/// Serialize one packet.
///
/// A `Registration` header is added when a token is supplied.
pub fn encode(seq: u32, command: &str, params: &str, body: &[u8], registration: Option<&str>) -> Vec<u8> {
    let headers = registration
        .map(|r| format!("Registration: {r}\r\n"))
        .unwrap_or_default();
    let len = body.len() + headers.len() + 2;

    let mut out = format!("{command} {seq} {params} {len}\r\n{headers}\r\n").into_bytes();
    out.extend_from_slice(body);
    out
}
