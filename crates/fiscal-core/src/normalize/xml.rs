//! XML to key/value tree conversion.
//!
//! The tree follows the usual dictionary conventions for XML: attributes
//! become `@name` keys, text next to attributes or children becomes `#text`,
//! repeated children collapse into an array, and an empty element is `null`.
//! Leaf elements with only text are plain strings.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::NormalizeError;

struct Frame {
    name: String,
    children: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Result<Self, NormalizeError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut children = Map::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| NormalizeError::Xml(format!("bad attribute in <{}>: {}", name, e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| NormalizeError::Xml(e.to_string()))?
                .into_owned();
            children.insert(format!("@{}", key), Value::String(value));
        }
        Ok(Self {
            name,
            children,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim();
        let value = if self.children.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        } else {
            let mut children = self.children;
            if !text.is_empty() {
                children.insert("#text".to_string(), Value::String(text.to_string()));
            }
            Value::Object(children)
        };
        (self.name, value)
    }
}

/// Insert `value` under `name`, turning repeated names into arrays.
fn attach(map: &mut Map<String, Value>, name: String, value: Value) {
    match map.get_mut(&name) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(name, value);
        }
    }
}

/// Parse an XML document into a tree rooted at `{root_name: ...}`.
pub fn parse_xml(xml: &str) -> Result<Value, NormalizeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root: Option<(String, Value)> = None;

    let mut finish = |stack: &mut Vec<Frame>, frame: Frame| -> Result<(), NormalizeError> {
        let (name, value) = frame.close();
        match stack.last_mut() {
            Some(parent) => attach(&mut parent.children, name, value),
            None if root.is_none() => root = Some((name, value)),
            None => return Err(NormalizeError::Xml("multiple root elements".to_string())),
        }
        Ok(())
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => stack.push(Frame::open(e)?),
            Ok(Event::Empty(ref e)) => {
                let frame = Frame::open(e)?;
                finish(&mut stack, frame)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| NormalizeError::Xml(err.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(_)) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| NormalizeError::Xml("unbalanced closing tag".to_string()))?;
                trace!("Closed <{}>", frame.name);
                finish(&mut stack, frame)?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(NormalizeError::Xml(format!(
                    "parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(NormalizeError::Xml("unexpected end of document".to_string()));
    }

    let (name, value) = root.ok_or_else(|| NormalizeError::Xml("document has no root element".to_string()))?;
    let mut tree = Map::new();
    tree.insert(name, value);
    Ok(Value::Object(tree))
}
