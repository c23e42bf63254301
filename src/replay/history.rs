//! Game History Documents
//!
//! A finished recording is a `GameHistory`: metadata plus the ordered event
//! list. It is stored either as flat JSON or as a tree-shaped XML document:
//!
//! ```text
//! <GameHistory>
//!   <Metadata><gameId>..</gameId>...</Metadata>
//!   <Events>
//!     <Event tick="0" timestamp="0" type="GAME_START">
//!       <seed>7</seed>
//!       <cells list="true"><Item><id>0</id>...</Item></cells>
//!     </Event>
//!   </Events>
//! </GameHistory>
//! ```
//!
//! String leaves are marked `type="str"`; any other leaf text that parses as
//! a boolean or a number becomes one. Lists are marked `list="true"`, nulls
//! `null="true"`.
//!
//! Events that do not fit the schema are logged and dropped on load; the rest
//! of the recording stays usable.

use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use serde::{Serialize, Deserialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::game::events::GameEvent;
use crate::replay::recorder::GameMetadata;

// =============================================================================
// ERRORS
// =============================================================================

/// Errors reading or writing a history document.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// File could not be read or written.
    #[error("history I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid JSON, or a document that does not fit the schema.
    #[error("invalid history JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid XML.
    #[error("invalid history XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Well-formed but structurally wrong document.
    #[error("malformed history: {0}")]
    Malformed(String),

    /// No `GAME_START` event to rebuild the board from.
    #[error("history has no GAME_START event")]
    MissingGameStart,
}

// =============================================================================
// DOCUMENT
// =============================================================================

/// A recorded game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameHistory {
    /// Descriptive metadata.
    pub metadata: GameMetadata,
    /// Events in emission order.
    pub events: Vec<GameEvent>,
}

impl GameHistory {
    /// The `GAME_START` event.
    pub fn game_start(&self) -> Result<&GameEvent, HistoryError> {
        self.events
            .iter()
            .find(|e| e.is_game_start())
            .ok_or(HistoryError::MissingGameStart)
    }

    /// Timestamp of the last event, in ms.
    pub fn duration_ms(&self) -> u64 {
        self.events.last().map_or(0, |e| e.timestamp)
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String, HistoryError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse JSON. Events that do not parse are skipped.
    pub fn from_json(json: &str) -> Result<Self, HistoryError> {
        let raw: RawHistory = serde_json::from_str(json)?;
        Ok(Self {
            metadata: raw.metadata,
            events: parse_events(raw.events),
        })
    }

    /// Indented XML.
    pub fn to_xml(&self) -> Result<String, HistoryError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("GameHistory")))?;

        write_value(&mut writer, "Metadata", &serde_json::to_value(&self.metadata)?)?;

        writer.write_event(Event::Start(BytesStart::new("Events")))?;
        for event in &self.events {
            let value = serde_json::to_value(event)?;
            let tick = event.tick.to_string();
            let timestamp = event.timestamp.to_string();
            let start = BytesStart::new("Event").with_attributes([
                ("tick", tick.as_str()),
                ("timestamp", timestamp.as_str()),
                ("type", event.data.event_type()),
            ]);
            writer.write_event(Event::Start(start))?;
            if let Some(Value::Object(data)) = value.get("data") {
                for (key, child) in data {
                    write_value(&mut writer, key, child)?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new("Event")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("Events")))?;
        writer.write_event(Event::End(BytesEnd::new("GameHistory")))?;

        String::from_utf8(writer.into_inner()).map_err(|e| HistoryError::Malformed(e.to_string()))
    }

    /// Parse XML written by `to_xml`.
    pub fn from_xml(xml: &str) -> Result<Self, HistoryError> {
        let root = parse_tree(xml)?;
        if root.name != "GameHistory" {
            return Err(HistoryError::Malformed(format!("unexpected root <{}>", root.name)));
        }

        let metadata = root
            .child("Metadata")
            .ok_or_else(|| HistoryError::Malformed("missing <Metadata>".into()))?;
        let metadata: GameMetadata = serde_json::from_value(node_to_value(metadata))?;

        let mut raw_events = Vec::new();
        if let Some(list) = root.child("Events") {
            for node in list.children.iter().filter(|n| n.name == "Event") {
                let mut data = Map::new();
                for child in &node.children {
                    data.insert(child.name.clone(), node_to_value(child));
                }
                let mut event = Map::new();
                event.insert("tick".into(), coerce_leaf(node.attr("tick").unwrap_or("0")));
                event.insert("timestamp".into(), coerce_leaf(node.attr("timestamp").unwrap_or("0")));
                event.insert("eventType".into(), Value::String(node.attr("type").unwrap_or_default().to_string()));
                event.insert("data".into(), Value::Object(data));
                raw_events.push(Value::Object(event));
            }
        }

        Ok(Self {
            metadata,
            events: parse_events(raw_events),
        })
    }

    /// Save to `path`; `.xml` files are XML, everything else JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), HistoryError> {
        let path = path.as_ref();
        let text = if is_xml(path) { self.to_xml()? } else { self.to_json()? };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, text)?;
        info!(path = %path.display(), events = self.events.len(), "Game history saved");
        Ok(())
    }

    /// Load from `path`, choosing the format by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        if is_xml(path) {
            Self::from_xml(&text)
        } else {
            Self::from_json(&text)
        }
    }
}

/// `GameHistory` with its events still untyped.
#[derive(Deserialize)]
struct RawHistory {
    metadata: GameMetadata,
    #[serde(default)]
    events: Vec<Value>,
}

fn parse_events(raw: Vec<Value>) -> Vec<GameEvent> {
    let total = raw.len();
    let mut events = Vec::with_capacity(total);
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<GameEvent>(value) {
            Ok(event) => events.push(event),
            Err(e) => warn!(index, error = %e, "Skipping malformed history event"),
        }
    }
    if events.len() < total {
        warn!(skipped = total - events.len(), kept = events.len(), "History loaded with skipped events");
    }
    events
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
}

// =============================================================================
// XML WRITING
// =============================================================================

fn write_value(writer: &mut Writer<Vec<u8>>, name: &str, value: &Value) -> Result<(), HistoryError> {
    match value {
        Value::Null => {
            writer.write_event(Event::Empty(BytesStart::new(name).with_attributes([("null", "true")])))?;
        }
        Value::Array(items) => {
            writer.write_event(Event::Start(BytesStart::new(name).with_attributes([("list", "true")])))?;
            for item in items {
                write_value(writer, "Item", item)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::Object(map) if map.is_empty() => {
            writer.write_event(Event::Empty(BytesStart::new(name).with_attributes([("map", "true")])))?;
        }
        Value::Object(map) => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            for (key, child) in map {
                write_value(writer, key, child)?;
            }
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        Value::String(text) => {
            writer.write_event(Event::Start(BytesStart::new(name).with_attributes([("type", "str")])))?;
            writer.write_event(Event::Text(BytesText::new(text)))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
        leaf => {
            writer.write_event(Event::Start(BytesStart::new(name)))?;
            writer.write_event(Event::Text(BytesText::new(&leaf.to_string())))?;
            writer.write_event(Event::End(BytesEnd::new(name)))?;
        }
    }
    Ok(())
}

// =============================================================================
// XML READING
// =============================================================================

#[derive(Debug, Default)]
struct XmlNode {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: String,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, HistoryError> {
        let mut node = XmlNode {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..XmlNode::default()
        };
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            node.attrs.push((key, value));
        }
        Ok(node)
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    fn flag(&self, key: &str) -> bool {
        self.attr(key) == Some("true")
    }

    fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

fn parse_tree(xml: &str) -> Result<XmlNode, HistoryError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(XmlNode::from_start(&start)?),
            Event::Empty(start) => {
                let node = XmlNode::from_start(&start)?;
                attach(&mut stack, &mut root, node);
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| HistoryError::Malformed("unbalanced end tag".into()))?;
                attach(&mut stack, &mut root, node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(HistoryError::Malformed("unclosed element".into()));
    }
    root.ok_or_else(|| HistoryError::Malformed("empty document".into()))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => *root = Some(node),
    }
}

fn node_to_value(node: &XmlNode) -> Value {
    if node.flag("null") {
        Value::Null
    } else if node.flag("list") {
        Value::Array(node.children.iter().map(node_to_value).collect())
    } else if node.attr("type") == Some("str") {
        Value::String(node.text.clone())
    } else if node.flag("map") {
        Value::Object(Map::new())
    } else if !node.children.is_empty() {
        let map = node
            .children
            .iter()
            .map(|child| (child.name.clone(), node_to_value(child)))
            .collect();
        Value::Object(map)
    } else {
        coerce_leaf(&node.text)
    }
}

/// Text to the most specific JSON scalar it spells.
fn coerce_leaf(text: &str) -> Value {
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = text.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(n) = text.parse::<u64>() {
        return Value::Number(n.into());
    }
    if text.contains(['.', 'e', 'E']) {
        if let Some(n) = text.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(text.to_string())
}

// =============================================================================
// TESTS
// =============================================================================
