//! Generic XML tree used by the description normalizer and event decoding.
//!
//! Documents are reduced to nested maps of element name to value:
//!
//! - attributes are ignored and namespace prefixes are dropped
//! - an element with no child elements becomes [`XmlValue::Text`]
//! - an element with child elements becomes [`XmlValue::Object`]
//! - sibling elements sharing a name collapse into [`XmlValue::Array`]
//!
//! The last rule means a list with a single entry and a list with many entries
//! have different shapes. Callers use [`sequence`] to read either uniformly.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{DiscoveryError, Result};

/// Children of an element keyed by (processed) tag name.
pub type XmlObject = BTreeMap<String, XmlValue>;

/// A parsed XML value.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    /// Leaf element text, unescaped and trimmed. Empty elements yield `""`.
    Text(String),
    /// Element with child elements
    Object(XmlObject),
    /// Repeated sibling elements, in document order
    Array(Vec<XmlValue>),
}

/// How element names are rewritten while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCase {
    /// Lower camel case, except names starting with two upper-case or
    /// non-letter characters (`UDN`, `SCPDURL`, `URLBase`) which are kept.
    CamelCase,
    /// Keep names exactly as written.
    Preserve,
}

impl TagCase {
    fn apply(self, name: &str) -> String {
        match self {
            TagCase::CamelCase => camel_case_tag(name),
            TagCase::Preserve => name.to_string(),
        }
    }
}

impl XmlValue {
    /// Text of a leaf element.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Children of an element.
    pub fn as_object(&self) -> Option<&XmlObject> {
        match self {
            XmlValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Child value by name. `None` for leaves and arrays.
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Text of a named child leaf.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(XmlValue::as_text)
    }

    /// Text of a named child leaf, owned, with empty strings treated as absent.
    pub fn non_empty_text(&self, key: &str) -> Option<String> {
        self.text(key)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    }
}

/// Coerce an absent, single or repeated value into a sequence.
pub fn sequence(value: Option<&XmlValue>) -> Vec<&XmlValue> {
    match value {
        None => Vec::new(),
        Some(XmlValue::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
    }
}

/// Parse a document into its top-level object.
///
/// The returned map holds exactly one entry: the root element.
pub fn parse_document(xml: &str, case: TagCase) -> Result<XmlObject> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    // Open elements: name, child elements, accumulated text
    let mut stack: Vec<(String, XmlObject, String)> = vec![(String::new(), XmlObject::new(), String::new())];

    loop {
        let event = reader.read_event().map_err(|e| {
            DiscoveryError::Parse(format!(
                "XML error at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => {
                let name = element_name(start.local_name().as_ref(), case)?;
                stack.push((name, XmlObject::new(), String::new()));
            }
            Event::Empty(start) => {
                let name = element_name(start.local_name().as_ref(), case)?;
                if let Some((_, parent, _)) = stack.last_mut() {
                    insert_child(parent, name, XmlValue::Text(String::new()));
                }
            }
            Event::Text(text) => {
                if let Some((_, _, buffer)) = stack.last_mut() {
                    buffer.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some((_, _, buffer)) = stack.last_mut() {
                    buffer.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(DiscoveryError::Parse("unbalanced end tag".to_string()));
                }
                let Some((name, children, text)) = stack.pop() else {
                    break;
                };
                let value = if children.is_empty() {
                    XmlValue::Text(text.trim().to_string())
                } else {
                    XmlValue::Object(children)
                };
                if let Some((_, parent, _)) = stack.last_mut() {
                    insert_child(parent, name, value);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(DiscoveryError::Parse("unexpected end of document".to_string()));
    }

    let (_, document, _) = stack.remove(0);
    if document.is_empty() {
        return Err(DiscoveryError::Parse("document has no root element".to_string()));
    }

    Ok(document)
}

/// Parse a document and return the value of its root element.
///
/// Fails if the root element is not named `expected_root` after tag processing.
pub fn parse_root(xml: &str, case: TagCase, expected_root: &str) -> Result<XmlValue> {
    let mut document = parse_document(xml, case)?;
    document.remove(expected_root).ok_or_else(|| {
        let found = document.keys().next().cloned().unwrap_or_default();
        DiscoveryError::Parse(format!(
            "expected root element <{expected_root}>, found <{found}>"
        ))
    })
}

fn element_name(raw: &[u8], case: TagCase) -> Result<String> {
    let name = std::str::from_utf8(raw)
        .map_err(|e| DiscoveryError::Parse(format!("invalid element name: {e}")))?;
    Ok(case.apply(name))
}

fn insert_child(parent: &mut XmlObject, name: String, value: XmlValue) {
    match parent.remove(&name) {
        None => {
            parent.insert(name, value);
        }
        Some(XmlValue::Array(mut items)) => {
            items.push(value);
            parent.insert(name, XmlValue::Array(items));
        }
        Some(existing) => {
            parent.insert(name, XmlValue::Array(vec![existing, value]));
        }
    }
}

/// Tag-name policy for description documents.
///
/// Names whose first two characters sort before `'a'` (upper-case letters,
/// digits, underscores) are left untouched; everything else is camel cased.
pub fn camel_case_tag(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first < 'a' && second < 'a' => name.to_string(),
        _ => camel_case(name),
    }
}

/// Convert an identifier to lower camel case.
///
/// Word boundaries are non-alphanumeric characters, a lower-case letter or
/// digit followed by an upper-case letter, and the last capital of an acronym
/// that is followed by a lower-case letter (`AVTransport` splits as `AV`,
/// `Transport`).
pub fn camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());

    for (index, word) in split_words(input).iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }

    out
}

fn split_words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let acronym_end = prev.is_uppercase() && next.map_or(false, char::is_lowercase);
            if prev.is_lowercase() || prev.is_ascii_digit() || acronym_end {
                words.push(std::mem::take(&mut current));
            }
        }

        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }

    words
}
