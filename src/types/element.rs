//! Element snapshots: the inbound `{data, position}` shape shared by every view.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form element attributes (`data` object of an element).
pub type Attributes = serde_json::Map<String, Value>;

/// Whether an element is a node or an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    /// A node (no endpoints).
    Node,
    /// An edge (has a source/target pair).
    Edge,
}

impl ElementKind {
    /// Parse element kind from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "node" | "nodes" => Some(Self::Node),
            "edge" | "edges" => Some(Self::Edge),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Node => write!(f, "node"),
            Self::Edge => write!(f, "edge"),
        }
    }
}

/// 2D position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a new position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Both coordinates are finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// One element as supplied by the document layer.
///
/// Nodes carry an `id`; edges carry `source` and `target` and optionally an `id`.
/// Everything else in `data` is an opaque attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Element attributes, including `id`/`source`/`target`.
    #[serde(default)]
    pub data: Attributes,
    /// Optional preset position (nodes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Document-store id, used for nodes whose `data` carries no `id`.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Value>,
}

impl ElementSnapshot {
    /// Create a node snapshot with the given id.
    pub fn node(id: impl Into<String>) -> Self {
        let mut data = Attributes::new();
        data.insert("id".into(), Value::String(id.into()));
        Self { data, ..Self::default() }
    }

    /// Create an edge snapshot without an explicit id.
    pub fn edge(source: impl Into<String>, target: impl Into<String>) -> Self {
        let mut data = Attributes::new();
        data.insert("source".into(), Value::String(source.into()));
        data.insert("target".into(), Value::String(target.into()));
        Self { data, ..Self::default() }
    }

    /// Create an edge snapshot with an explicit id.
    pub fn edge_with_id(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self::edge(source, target).with_attr("id", id.into())
    }

    /// Builder: set an attribute.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Builder: set the document-store id.
    pub fn with_record_id(mut self, id: impl Into<Value>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    /// Builder: set a preset position.
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position::new(x, y));
        self
    }

    /// Explicit id, stringified.
    pub fn id(&self) -> Option<String> {
        self.data.get("id").and_then(value_to_id)
    }

    /// Node id: `data.id`, else the document-store `_id`.
    pub fn node_id(&self) -> Option<String> {
        self.id().or_else(|| self.record_id.as_ref().and_then(value_to_id))
    }

    /// Edge source id.
    pub fn source(&self) -> Option<String> {
        self.data.get("source").and_then(value_to_id)
    }

    /// Edge target id.
    pub fn target(&self) -> Option<String> {
        self.data.get("target").and_then(value_to_id)
    }

    /// An element is an edge as soon as it names either endpoint.
    pub fn kind(&self) -> ElementKind {
        let names = |key: &str| self.data.get(key).is_some_and(|v| !v.is_null());
        if names("source") || names("target") {
            ElementKind::Edge
        } else {
            ElementKind::Node
        }
    }

    /// Raw attribute lookup.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}

/// Stringify an id-like JSON value. Strings and numbers are accepted.
pub fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a finite number from an attribute, accepting numeric strings.
pub fn attr_number(attrs: &Attributes, key: &str) -> Option<f64> {
    let n = match attrs.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Read a non-empty string attribute.
pub fn attr_str<'a>(attrs: &'a Attributes, key: &str) -> Option<&'a str> {
    match attrs.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_endpoints() {
        assert_eq!(ElementSnapshot::node("a").kind(), ElementKind::Node);
        assert_eq!(ElementSnapshot::edge("a", "b").kind(), ElementKind::Edge);

        let half: ElementSnapshot =
            serde_json::from_value(json!({"data": {"id": "x", "target": "b"}})).unwrap();
        assert_eq!(half.kind(), ElementKind::Edge);

        let null_endpoints: ElementSnapshot =
            serde_json::from_value(json!({"data": {"id": "x", "source": null}})).unwrap();
        assert_eq!(null_endpoints.kind(), ElementKind::Node);
    }

    #[test]
    fn test_numeric_ids_are_stringified() {
        let el: ElementSnapshot = serde_json::from_value(json!({"data": {"id": 5}})).unwrap();
        assert_eq!(el.id().as_deref(), Some("5"));
        assert_eq!(value_to_id(&json!("")), None);
        assert_eq!(value_to_id(&json!(true)), None);
    }

    #[test]
    fn test_node_id_falls_back_to_record_id() {
        let el: ElementSnapshot =
            serde_json::from_value(json!({"_id": "doc-7", "data": {"name": "Lisbon"}})).unwrap();
        assert_eq!(el.id(), None);
        assert_eq!(el.node_id().as_deref(), Some("doc-7"));

        // data.id wins when both are present
        let both = ElementSnapshot::node("n1").with_record_id("doc-8");
        assert_eq!(both.node_id().as_deref(), Some("n1"));
    }

    #[test]
    fn test_wire_shape_with_position() {
        let el: ElementSnapshot = serde_json::from_value(json!({
            "data": {"id": "n1", "weight": "3.5"},
            "position": {"x": 1.0, "y": -2.0}
        }))
        .unwrap();
        assert_eq!(el.position, Some(Position::new(1.0, -2.0)));
        assert_eq!(attr_number(&el.data, "weight"), Some(3.5));
        assert_eq!(attr_number(&el.data, "missing"), None);
    }

    #[test]
    fn test_attr_number_rejects_non_finite() {
        let el = ElementSnapshot::node("n").with_attr("x", "NaN");
        assert_eq!(attr_number(&el.data, "x"), None);
    }
}
