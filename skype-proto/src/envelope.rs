//! The routed, three-block message format carried in `SDG`, `NFY` and
//! presence publications.
//!
//! ```text
//! Routing: 1.0\r\n
//! To: <receiver>\r\n
//! From: <sender>\r\n
//! \r\n
//! Reliability: 1.0\r\n
//! \r\n
//! <kind line, e.g. Messaging: 2.0>\r\n
//! (<Key>: <Value>\r\n)*
//! Content-Length: <n>\r\n
//! \r\n
//! <body>
//! ```

use std::fmt;

const SEPARATOR: &str = "\r\n\r\n";

// ─── Error ────────────────────────────────────────────────────────────────────

/// Failure to parse an [`Envelope`].
#[derive(Clone, Debug, PartialEq)]
pub enum ParseError {
    /// Fewer than three `\r\n\r\n` block separators.
    MissingSeparator,
    /// The routing block lacks `To` or `From`.
    MissingField(&'static str),
    /// A line of the header block has no `: ` separator or no value.
    MalformedHeader(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSeparator    => write!(f, "envelope has fewer than three blocks"),
            Self::MissingField(name)  => write!(f, "envelope routing block lacks {name}"),
            Self::MalformedHeader(l)  => write!(f, "malformed envelope header: {l:?}"),
        }
    }
}

impl std::error::Error for ParseError {}

// ─── Envelope ─────────────────────────────────────────────────────────────────

/// A parsed or to-be-formatted message envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// The `From` identity, e.g. `8:alice;epid={…}`.
    pub sender: String,
    /// The `To` identity.
    pub receiver: String,
    /// The line opening the header block, e.g. `Messaging: 2.0`.
    pub kind: String,
    /// Custom headers in wire order. `Content-Length` is never stored here;
    /// it is derived from the body.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Envelope {
    pub fn new(
        sender:   impl Into<String>,
        receiver: impl Into<String>,
        kind:     impl Into<String>,
        body:     impl Into<String>,
    ) -> Self {
        Self {
            sender:   sender.into(),
            receiver: receiver.into(),
            kind:     kind.into(),
            headers:  Vec::new(),
            body:     body.into(),
        }
    }

    /// Append a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Look up the first header named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// The `Message-Type` header.
    pub fn message_type(&self) -> Option<&str> {
        self.get("Message-Type")
    }

    /// Serialize to the wire format.
    pub fn format(&self) -> String {
        let mut out = format!(
            "Routing: 1.0\r\nTo: {}\r\nFrom: {}\r\n\r\nReliability: 1.0\r\n\r\n{}\r\n",
            self.receiver, self.sender, self.kind,
        );
        for (key, value) in &self.headers {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        out.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));
        out.push_str(&self.body);
        out
    }

    /// Parse the wire format.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let first = text.find(SEPARATOR).ok_or(ParseError::MissingSeparator)?;
        let second_start = first + SEPARATOR.len();
        let second = second_start + text[second_start..].find(SEPARATOR).ok_or(ParseError::MissingSeparator)?;
        let third_start = second + SEPARATOR.len();
        let third = third_start + text[third_start..].find(SEPARATOR).ok_or(ParseError::MissingSeparator)?;

        let routing = &text[..first];
        let receiver = routing_field(routing, "To").ok_or(ParseError::MissingField("To"))?;
        let sender = routing_field(routing, "From").ok_or(ParseError::MissingField("From"))?;

        let mut kind = None;
        let mut headers = Vec::new();
        for line in text[third_start..third].split("\r\n") {
            let (key, value) = line
                .split_once(": ")
                .filter(|(_, v)| !v.is_empty())
                .ok_or_else(|| ParseError::MalformedHeader(line.to_string()))?;
            if kind.is_none() {
                kind = Some(line.to_string());
            } else if key != "Content-Length" {
                headers.push((key.to_string(), value.to_string()));
            }
        }

        Ok(Self {
            sender:   sender.to_string(),
            receiver: receiver.to_string(),
            kind:     kind.unwrap_or_default(),
            headers,
            body:     text[third + SEPARATOR.len()..].to_string(),
        })
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

fn routing_field<'a>(block: &'a str, name: &str) -> Option<&'a str> {
    block.split("\r\n").find_map(|line| {
        line.strip_prefix(name)
            .and_then(|rest| rest.strip_prefix(": "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope::new("8:alice;epid={e1}", "19:abc@thread.skype", "Messaging: 2.0", "hi <b>there</b>")
            .header("Content-Type", "application/user+xml")
            .header("Message-Type", "RichText")
    }

    #[test]
    fn format_layout() {
        assert_eq!(
            sample().format(),
            "Routing: 1.0\r\nTo: 19:abc@thread.skype\r\nFrom: 8:alice;epid={e1}\r\n\r\n\
             Reliability: 1.0\r\n\r\n\
             Messaging: 2.0\r\nContent-Type: application/user+xml\r\nMessage-Type: RichText\r\n\
             Content-Length: 15\r\n\r\nhi <b>there</b>"
        );
    }

    #[test]
    fn parse_inverts_format() {
        let env = sample();
        let back = Envelope::parse(&env.format()).unwrap();
        assert_eq!(back, env);
        assert_eq!(back.message_type(), Some("RichText"));
    }

    #[test]
    fn body_may_contain_separators() {
        let env = Envelope::new("8:a", "8:b", "Messaging: 2.0", "one\r\n\r\ntwo");
        assert_eq!(Envelope::parse(&env.format()).unwrap().body, "one\r\n\r\ntwo");
    }

    #[test]
    fn missing_blocks() {
        assert_eq!(Envelope::parse("Routing: 1.0\r\nTo: 8:a\r\nFrom: 8:b\r\n\r\nReliability: 1.0\r\n"),
                   Err(ParseError::MissingSeparator));
        assert_eq!(Envelope::parse("no blocks at all"), Err(ParseError::MissingSeparator));
    }

    #[test]
    fn missing_routing_fields() {
        let text = "Routing: 1.0\r\nFrom: 8:b\r\n\r\nReliability: 1.0\r\n\r\nMessaging: 2.0\r\n\r\n";
        assert_eq!(Envelope::parse(text), Err(ParseError::MissingField("To")));
    }

    #[test]
    fn header_without_separator() {
        let text = "Routing: 1.0\r\nTo: 8:a\r\nFrom: 8:b\r\n\r\nReliability: 1.0\r\n\r\n\
                    Messaging: 2.0\r\nBroken\r\n\r\nbody";
        assert_eq!(Envelope::parse(text), Err(ParseError::MalformedHeader("Broken".into())));
    }
}
