//! Per-connection framing state.

use crate::packet::{self, Error, Frame, Packet};

/// Tracks the sequence counter and registration token of one session.
///
/// The counter restarts at zero for every new socket (see [`Session::reset`]);
/// the registration token survives resets because the server expects it
/// back after a redirect.
///
/// # Example
///
/// ```rust
/// use skype_proto::Session;
///
/// let mut session = Session::new();
/// let wire = session.encode("PNG", "CON", b"");
/// assert_eq!(wire, b"PNG 1 CON 2\r\n\r\n");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Session {
    /// Sequence number of the last packet sent.
    seq: u32,
    /// Token learned from the last `Set-Registration` header.
    registration: Option<String>,
}

impl Session {
    /// Create a fresh session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number of the last packet sent (0 before the first send).
    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// The current registration token, if one was learned.
    pub fn registration(&self) -> Option<&str> {
        self.registration.as_deref()
    }

    /// Start over on a new socket: the counter goes back to 0.
    pub fn reset(&mut self) {
        self.seq = 0;
    }

    /// Frame a packet with the next sequence number and the current
    /// registration token.
    pub fn encode(&mut self, command: &str, params: &str, body: &[u8]) -> Vec<u8> {
        self.seq = self.seq.wrapping_add(1);
        packet::encode(self.seq, command, params, body, self.registration.as_deref())
    }

    /// Interpret one inbound frame.
    ///
    /// Returns `Ok(None)` for the benign error code, which must be skipped,
    /// and an error for any other numeric status. A `Set-Registration`
    /// header updates the stored token.
    pub fn accept(&mut self, frame: Frame) -> Result<Option<Packet>, Error> {
        if frame.header.is_benign() {
            log::debug!("[skype] skipping benign status {}", frame.header.command);
            return Ok(None);
        }
        if frame.header.is_error_code() {
            return Err(frame.into_server_error());
        }
        let (packet, registration) = frame.into_packet()?;
        if let Some(token) = registration {
            self.registration = Some(token);
        }
        Ok(Some(packet))
    }

    /// Decode the next packet from the front of `buf`.
    ///
    /// Benign statuses are consumed silently. Returns the packet and the
    /// total number of bytes consumed, or `Ok(None)` if more input is needed.
    pub fn decode(&mut self, buf: &[u8]) -> Result<Option<(Packet, usize)>, Error> {
        let mut offset = 0;
        loop {
            let Some((frame, used)) = Frame::decode(&buf[offset..])? else {
                return Ok(None);
            };
            offset += used;
            if let Some(packet) = self.accept(frame)? {
                return Ok(Some((packet, offset)));
            }
        }
    }
}
