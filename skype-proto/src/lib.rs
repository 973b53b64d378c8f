//! Sans-IO core of the Skype notification protocol.
//!
//! This crate handles:
//! * Packet framing (sequence numbers, payload headers, registration tokens)
//! * Routed message envelopes
//! * Wire identities, presence codes and group roles
//! * The XML documents carried in packet bodies
//! * The binary steps of the UIC token handshake
//!
//! It performs no I/O: bring your own socket.

#![deny(unsafe_code)]

pub mod envelope;
pub mod identity;
pub mod message;
pub mod packet;
pub mod presence;
pub mod session;
pub mod tlv;
pub mod uic;
pub mod xml;

pub use envelope::Envelope;
pub use identity::{EntityKind, WireIdentity};
pub use message::{Message, MessageKind};
pub use packet::{Frame, Packet};
pub use presence::{Presence, Role};
pub use session::Session;
