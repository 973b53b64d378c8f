//! Minimal XML tree for the small documents carried in packet bodies.

use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

// ─── Error ────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// The underlying reader rejected the document.
    Syntax(String),
    /// No root element, or unbalanced tags.
    Structure,
    /// A field expected at most once occurred several times.
    Duplicate(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(e)    => write!(f, "XML syntax error: {e}"),
            Self::Structure    => write!(f, "XML document has no single root element"),
            Self::Duplicate(n) => write!(f, "XML field <{n}> occurs more than once"),
        }
    }
}

impl std::error::Error for Error {}

fn syntax(e: impl fmt::Display) -> Error {
    Error::Syntax(e.to_string())
}

// ─── Tree ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub name:     String,
    pub attrs:    Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, Error> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(syntax)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(syntax)?.into_owned();
            attrs.push((key, value));
        }
        Ok(Self { name, attrs, children: Vec::new() })
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Direct child elements.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First direct child element named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Whether this element has any child node at all.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// All descendant elements named `name`, in document order, including
    /// this element itself.
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect(name, &mut out);
        out
    }

    fn collect<'a>(&'a self, name: &str, out: &mut Vec<&'a Element>) {
        if self.name == name {
            out.push(self);
        }
        for e in self.elements() {
            e.collect(name, out);
        }
    }

    /// Concatenated text of this element and all its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.push_text(out),
            }
        }
    }

    /// Text of the unique descendant named `name`.
    ///
    /// `Ok(None)` if absent, an error if it occurs more than once.
    pub fn field(&self, name: &str) -> Result<Option<String>, Error> {
        match self.descendants(name).as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(one.text())),
            _ => Err(Error::Duplicate(name.to_string())),
        }
    }

    /// Texts of every descendant named `name`.
    pub fn fields(&self, name: &str) -> Vec<String> {
        self.descendants(name).into_iter().map(Element::text).collect()
    }
}

/// Parse a document and return its root element.
pub fn parse(xml: &str) -> Result<Element, Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event().map_err(syntax)? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(Error::Structure)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.children.push(Node::Text(text.unescape().map_err(syntax)?.into_owned()));
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.children.push(Node::Text(String::from_utf8_lossy(&data.into_inner()).into_owned()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::Structure);
    }
    root.ok_or(Error::Structure)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), Error> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::Structure),
    }
    Ok(())
}

/// Escape text for inclusion in element content or attribute values.
pub fn escape(raw: &str) -> String {
    quick_xml::escape::escape(raw).into_owned()
}

/// Render a rich-text fragment as plain text.
///
/// Markup is dropped, entities are resolved and runs of whitespace collapse
/// to a single space. Fragments that are not well-formed fall back to naive
/// tag stripping.
pub fn plain_text(fragment: &str) -> String {
    let text = match parse(&format!("<body>{fragment}</body>")) {
        Ok(root) => root.text(),
        Err(_) => strip_tags(fragment),
    };
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
