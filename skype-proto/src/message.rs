//! Chat message payloads.

use crate::envelope::Envelope;
use crate::xml;

/// What a message carries, chosen from its `Message-Type` header.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    Picture,
    File,
    Video,
    Contact,
    Moji,
    /// Any other type, kept verbatim.
    Unknown(String),
}

impl MessageKind {
    pub fn from_header(message_type: &str) -> Self {
        match message_type {
            "Text" | "RichText"          => Self::Text,
            "RichText/UriObject"         => Self::Picture,
            "RichText/Media_GenericFile" => Self::File,
            "RichText/Media_Video"       => Self::Video,
            "RichText/Contacts"          => Self::Contact,
            "RichText/Media_FlikMsg"     => Self::Moji,
            other                        => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Text       => "RichText",
            Self::Picture    => "RichText/UriObject",
            Self::File       => "RichText/Media_GenericFile",
            Self::Video      => "RichText/Media_Video",
            Self::Contact    => "RichText/Contacts",
            Self::Moji       => "RichText/Media_FlikMsg",
            Self::Unknown(s) => s,
        }
    }
}

/// An inbound chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    /// The body as received, markup included.
    pub body: String,
    /// The body with markup removed and entities resolved.
    pub text: String,
}

impl Message {
    /// Build from an envelope; `None` if it has no `Message-Type`.
    pub fn from_envelope(envelope: &Envelope) -> Option<Self> {
        let kind = MessageKind::from_header(envelope.message_type()?);
        Some(Self {
            kind,
            text: xml::plain_text(&envelope.body),
            body: envelope.body.clone(),
        })
    }
}

/// Make caller text safe to send.
///
/// C0 and C1 control characters are dropped; `\r`, `\n` and `\r\n` line
/// breaks all become `\r\n`.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_cr = false;
    for c in raw.chars() {
        if c.is_control() {
            match c {
                '\r' => {
                    if pending_cr {
                        out.push_str("\r\n");
                    }
                    pending_cr = true;
                }
                '\n' => {
                    out.push_str("\r\n");
                    pending_cr = false;
                }
                _ => {
                    if pending_cr {
                        out.push_str("\r\n");
                        pending_cr = false;
                    }
                }
            }
        } else {
            if pending_cr {
                out.push_str("\r\n");
                pending_cr = false;
            }
            out.push(c);
        }
    }
    if pending_cr {
        out.push_str("\r\n");
    }
    out
}
