//! Minimal order-preserving XML document tree
//!
//! Backs the normalizer and the canonical rewriter. Elements keep their
//! leading text and trailing tail exactly as read, so a document that is
//! parsed and serialized without modification comes back byte-for-byte
//! (modulo the re-authored prolog). Comments and processing instructions
//! are dropped at parse time; the downstream consumer never carries them.

use crate::error::RosterError;
use quick_xml::events::Event;
use quick_xml::Reader;

/// Fixed prolog for every generated document. The consuming system expects
/// version 1.1 with an explicit standalone flag, so this is re-authored
/// rather than copied from the source declaration.
pub const XML_PROLOG: &str = "<?xml version=\"1.1\" encoding=\"UTF-8\" standalone=\"no\" ?>\n";

/// One XML element with its mixed-content bookkeeping.
///
/// `text` is the character data before the first child, `tail` the
/// character data after this element's close tag inside its parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub tail: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            text: None,
            tail: None,
            children: Vec::new(),
        }
    }

    /// First direct child with the given tag name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    /// Text of the first direct child with the given tag name, if any.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.find(name).and_then(|c| c.text.as_deref())
    }

    /// Direct children with the given tag name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Remove every direct child with the given tag name, returning them in
    /// document order. Remaining children keep their relative order.
    pub fn detach_children(&mut self, name: &str) -> Vec<Element> {
        let mut detached = Vec::new();
        let mut kept = Vec::with_capacity(self.children.len());
        for child in self.children.drain(..) {
            if child.name == name {
                detached.push(child);
            } else {
                kept.push(child);
            }
        }
        self.children = kept;
        detached
    }

    /// Drop direct children with the given tag name that fail the predicate.
    pub fn retain_children_named<F>(&mut self, name: &str, mut keep: F)
    where
        F: FnMut(&Element) -> bool,
    {
        self.children.retain(|c| c.name != name || keep(c));
    }

    pub fn append(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Visit every descendant with the given tag name, in document order.
    pub fn for_each_descendant<'a, F>(&'a self, name: &str, visit: &mut F)
    where
        F: FnMut(&'a Element),
    {
        for child in &self.children {
            if child.name == name {
                visit(child);
            }
            child.for_each_descendant(name, visit);
        }
    }

    /// Mutable variant of [`for_each_descendant`](Self::for_each_descendant).
    pub fn for_each_descendant_mut<F>(&mut self, name: &str, visit: &mut F)
    where
        F: FnMut(&mut Element),
    {
        for child in &mut self.children {
            if child.name == name {
                visit(child);
            }
            child.for_each_descendant_mut(name, visit);
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
}

impl Document {
    /// Parse a byte stream into a document tree.
    ///
    /// Malformed input fails with [`RosterError::MalformedXml`]; the caller
    /// surfaces that as a rejected upload.
    pub fn parse(bytes: &[u8]) -> Result<Self, RosterError> {
        let mut reader = Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| RosterError::MalformedXml(e.to_string()))?
            {
                Event::Start(start) => {
                    let element = element_from_start(&start)?;
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let element = element_from_start(&start)?;
                    place(element, &mut stack, &mut root)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| RosterError::MalformedXml("unexpected close tag".into()))?;
                    place(element, &mut stack, &mut root)?;
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|e| RosterError::MalformedXml(e.to_string()))?;
                    append_text(&mut stack, &value);
                }
                Event::CData(cdata) => {
                    let value = String::from_utf8_lossy(&cdata).into_owned();
                    append_text(&mut stack, &value);
                }
                // Declarations, comments, PIs and doctypes are not carried.
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(RosterError::MalformedXml("unclosed element".into()));
        }
        root.map(|root| Document { root })
            .ok_or_else(|| RosterError::MalformedXml("no root element".into()))
    }

    /// Serialize to the fixed output format: literal 1.1 prolog, every
    /// element as an open/close pair (never self-closing).
    pub fn serialize(&self) -> String {
        let mut out = String::from(XML_PROLOG);
        write_element(&self.root, &mut out);
        if let Some(tail) = &self.root.tail {
            escape_text(tail, &mut out);
        }
        out
    }

    pub fn serialize_bytes(&self) -> Vec<u8> {
        self.serialize().into_bytes()
    }
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> Result<Element, RosterError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| RosterError::MalformedXml(e.to_string()))?
        .to_string();
    let mut element = Element::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| RosterError::MalformedXml(e.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| RosterError::MalformedXml(e.to_string()))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| RosterError::MalformedXml(e.to_string()))?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

fn place(
    element: Element,
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
) -> Result<(), RosterError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        Ok(())
    } else if root.is_none() {
        *root = Some(element);
        Ok(())
    } else {
        Err(RosterError::MalformedXml(
            "content after document root".into(),
        ))
    }
}

fn append_text(stack: &mut Vec<Element>, value: &str) {
    let Some(top) = stack.last_mut() else {
        // Whitespace outside the root element is not carried.
        return;
    };
    let slot = match top.children.last_mut() {
        Some(last_child) => last_child.tail.get_or_insert_with(String::new),
        None => top.text.get_or_insert_with(String::new),
    };
    slot.push_str(value);
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
    if let Some(text) = &element.text {
        escape_text(text, out);
    }
    for child in &element.children {
        write_element(child, out);
        if let Some(tail) = &child.tail {
            escape_text(tail, out);
        }
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn escape_text(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            other => out.push(other),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            '\n' => out.push_str("&#10;"),
            '\t' => out.push_str("&#09;"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "<config>\n  <group id=\"1\">\n    <name>Alpha &amp; Beta</name>\n    <empty></empty>\n  </group>\n</config>";

    #[test]
    fn test_round_trip_preserves_body() {
        let doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        let out = doc.serialize();
        assert_eq!(out, format!("{}{}", XML_PROLOG, SAMPLE));
    }

    #[test]
    fn test_declaration_is_replaced() {
        let input = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", SAMPLE);
        let doc = Document::parse(input.as_bytes()).unwrap();
        assert!(doc.serialize().starts_with(XML_PROLOG));
    }

    #[test]
    fn test_empty_elements_get_close_tags() {
        let doc = Document::parse(b"<a><b/></a>").unwrap();
        assert_eq!(doc.serialize(), format!("{}<a><b></b></a>", XML_PROLOG));
    }

    #[test]
    fn test_find_and_child_text() {
        let doc = Document::parse(SAMPLE.as_bytes()).unwrap();
        let group = doc.root.find("group").unwrap();
        assert_eq!(group.child_text("name"), Some("Alpha & Beta"));
        assert_eq!(group.attrs[0], ("id".to_string(), "1".to_string()));
    }

    #[test]
    fn test_detach_children_preserves_others() {
        let mut doc = Document::parse(b"<r><a>1</a><b>2</b><a>3</a></r>").unwrap();
        let detached = doc.root.detach_children("a");
        assert_eq!(detached.len(), 2);
        assert_eq!(detached[0].text.as_deref(), Some("1"));
        assert_eq!(doc.root.children.len(), 1);
        assert_eq!(doc.root.children[0].name, "b");
    }

    #[test]
    fn test_malformed_input_is_rejected() {
        assert!(matches!(
            Document::parse(b"<a><b></a>"),
            Err(RosterError::MalformedXml(_))
        ));
        assert!(matches!(
            Document::parse(b"not xml at all"),
            Err(RosterError::MalformedXml(_))
        ));
    }

    #[test]
    fn test_comments_are_dropped() {
        let doc = Document::parse(b"<a><!-- note --><b></b></a>").unwrap();
        assert_eq!(doc.serialize(), format!("{}<a><b></b></a>", XML_PROLOG));
    }
}
