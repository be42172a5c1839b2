//! Element normalizer: flat elements array → attributed graph.
//!
//! The normalized graph is keyed by stable string ids and uses BTreeMaps so that
//! iteration order (and therefore layout seeding, parallel edge indexing and frame
//! output) is deterministic.
//!
//! ## Dropping Rules
//!
//! - Nodes without an id (`data.id`, else the document `_id`) are dropped
//! - Edges missing either endpoint, or naming an endpoint that is not a known node,
//!   are dropped (never rendered dangling)
//! - Duplicate ids merge: later attributes win
//!
//! Drops are counted in a [`NormalizeReport`] and never fail the caller.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::canonical::{derived_edge_id, CanonicalKey};
use crate::config::ScaleRange;
use crate::types::{
    attr_number, value_to_id, Attributes, ElementKind, ElementSnapshot, Position,
};

/// Fields probed for a node label, in priority order.
pub const NODE_LABEL_FIELDS: [&str; 5] = ["_vizLabel", "label", "name", "title", "emoji"];

/// Fields probed for an edge label, in priority order.
pub const EDGE_LABEL_FIELDS: [&str; 6] =
    ["_relVizLabel", "label", "relationship", "emoji", "title", "name"];

/// Weight assumed for elements without a numeric `weight`.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// Linear map of `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// A degenerate input range maps to the midpoint of the output range. The result
/// is not clamped.
pub fn map_range(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    let span = in_max - in_min;
    if !span.is_finite() || span.abs() < f64::EPSILON || !value.is_finite() {
        return (out_min + out_max) / 2.0;
    }
    out_min + (value - in_min) * (out_max - out_min) / span
}

/// Label offset for the `index`-th of `count` parallel edges.
///
/// Indices `[0, count)` map linearly onto `[-spread, spread]`; a lone edge gets no offset.
pub fn parallel_label_offset(index: usize, count: usize, spread: f64) -> f64 {
    if count <= 1 {
        return 0.0;
    }
    map_range(index as f64, 0.0, count as f64, -spread, spread)
}

/// Observed min/max of a weight attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightRange {
    /// Smallest weight.
    pub min: f64,
    /// Largest weight (always > `min`).
    pub max: f64,
}

impl Default for WeightRange {
    fn default() -> Self {
        Self { min: DEFAULT_WEIGHT, max: DEFAULT_WEIGHT + 1.0 }
    }
}

impl WeightRange {
    /// Range over the given weights; empty or degenerate input widens to `[min, min + 1]`.
    pub fn from_weights(weights: impl IntoIterator<Item = f64>) -> Self {
        let mut bounds: Option<(f64, f64)> = None;
        for w in weights.into_iter().filter(|w| w.is_finite()) {
            bounds = Some(match bounds {
                Some((lo, hi)) => (lo.min(w), hi.max(w)),
                None => (w, w),
            });
        }
        match bounds {
            Some((lo, hi)) if hi > lo => Self { min: lo, max: hi },
            Some((lo, _)) => Self { min: lo, max: lo + 1.0 },
            None => Self::default(),
        }
    }

    /// Map a weight onto an output range.
    pub fn scale(&self, weight: f64, out: ScaleRange) -> f64 {
        map_range(weight, self.min, self.max, out.min, out.max)
    }
}

/// A normalized node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    /// Node id.
    pub id: String,
    /// Attributes, including `id`.
    pub attrs: Attributes,
    /// Position if one is known.
    pub position: Option<Position>,
}

impl NodeRecord {
    /// Numeric weight or [`DEFAULT_WEIGHT`].
    pub fn weight(&self) -> f64 {
        attr_number(&self.attrs, "weight").unwrap_or(DEFAULT_WEIGHT)
    }

    /// Display label.
    pub fn label(&self) -> String {
        first_text(&self.attrs, &NODE_LABEL_FIELDS).unwrap_or_else(|| self.id.clone())
    }

    /// Canonical key.
    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::node(&self.id)
    }

    /// Back to the wire shape.
    pub fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot { data: self.attrs.clone(), position: self.position, record_id: None }
    }
}

/// A normalized edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeRecord {
    /// Explicit or derived (`source|target`) id.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Attributes, including `id`, `source` and `target`.
    pub attrs: Attributes,
    /// Position among edges sharing the same unordered endpoint pair.
    pub parallel_index: usize,
    /// Size of that group.
    pub parallel_count: usize,
}

impl EdgeRecord {
    /// Numeric weight or [`DEFAULT_WEIGHT`].
    pub fn weight(&self) -> f64 {
        attr_number(&self.attrs, "weight").unwrap_or(DEFAULT_WEIGHT)
    }

    /// Display label, if any.
    pub fn label(&self) -> Option<String> {
        first_text(&self.attrs, &EDGE_LABEL_FIELDS)
    }

    /// Whether the edge carries an explicit direction indicator.
    pub fn is_directed(&self) -> bool {
        is_directed(&self.attrs)
    }

    /// Source equals target.
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }

    /// Canonical key.
    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::edge(&self.id)
    }

    /// Back to the wire shape.
    pub fn snapshot(&self) -> ElementSnapshot {
        ElementSnapshot { data: self.attrs.clone(), position: None, record_id: None }
    }
}

/// Direction indicator: `enlightement == "arrow"` (any case) or a truthy `arrow`.
pub fn is_directed(attrs: &Attributes) -> bool {
    let enlightened = attrs
        .get("enlightement")
        .and_then(Value::as_str)
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("arrow"));
    let arrow = match attrs.get("arrow") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    };
    enlightened || arrow
}

fn first_text(attrs: &Attributes, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|f| attrs.get(*f))
        .find_map(|v| value_to_id(v).filter(|s| !s.trim().is_empty()))
}

/// Counts from one normalization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeReport {
    /// Nodes inserted or merged.
    pub nodes: usize,
    /// Edges inserted or merged.
    pub edges: usize,
    /// Nodes dropped for lacking an id.
    pub dropped_nodes: usize,
    /// Edges dropped for missing or unknown endpoints.
    pub dropped_edges: usize,
}

/// Nodes and edges keyed by stable id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttributedGraph {
    nodes: BTreeMap<String, NodeRecord>,
    edges: BTreeMap<String, EdgeRecord>,
    node_weights: WeightRange,
    edge_weights: WeightRange,
}

/// Normalize an elements array, logging what was dropped.
pub fn normalize(elements: &[ElementSnapshot]) -> AttributedGraph {
    AttributedGraph::from_elements(elements).0
}

impl AttributedGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from an elements array.
    pub fn from_elements(elements: &[ElementSnapshot]) -> (Self, NormalizeReport) {
        let mut graph = Self::new();
        let report = graph.merge(elements);
        (graph, report)
    }

    /// Merge elements into the graph.
    ///
    /// Nodes are merged first so that edges in the same batch may reference them.
    pub fn merge(&mut self, elements: &[ElementSnapshot]) -> NormalizeReport {
        let mut report = NormalizeReport::default();

        for el in elements.iter().filter(|e| e.kind() == ElementKind::Node) {
            let Some(id) = el.node_id() else {
                report.dropped_nodes += 1;
                continue;
            };
            let entry = self.nodes.entry(id.clone()).or_insert_with(|| NodeRecord {
                id: id.clone(),
                attrs: Attributes::new(),
                position: None,
            });
            for (k, v) in &el.data {
                entry.attrs.insert(k.clone(), v.clone());
            }
            entry.attrs.insert("id".into(), Value::String(id));
            if el.position.is_some() {
                entry.position = el.position;
            }
            report.nodes += 1;
        }

        for el in elements.iter().filter(|e| e.kind() == ElementKind::Edge) {
            let (Some(source), Some(target)) = (el.source(), el.target()) else {
                report.dropped_edges += 1;
                continue;
            };
            if !self.nodes.contains_key(&source) || !self.nodes.contains_key(&target) {
                report.dropped_edges += 1;
                continue;
            }
            let id = el.id().unwrap_or_else(|| derived_edge_id(&source, &target));
            let entry = self.edges.entry(id.clone()).or_insert_with(|| EdgeRecord {
                id: id.clone(),
                source: source.clone(),
                target: target.clone(),
                attrs: Attributes::new(),
                parallel_index: 0,
                parallel_count: 1,
            });
            for (k, v) in &el.data {
                entry.attrs.insert(k.clone(), v.clone());
            }
            entry.source = source.clone();
            entry.target = target.clone();
            entry.attrs.insert("id".into(), Value::String(id));
            entry.attrs.insert("source".into(), Value::String(source));
            entry.attrs.insert("target".into(), Value::String(target));
            report.edges += 1;
        }

        if report.dropped_nodes > 0 || report.dropped_edges > 0 {
            tracing::debug!(
                dropped_nodes = report.dropped_nodes,
                dropped_edges = report.dropped_edges,
                "Dropped malformed elements during normalization"
            );
        }

        self.reindex();
        report
    }

    /// Remove elements. Removing a node also removes its incident edges.
    ///
    /// Returns the keys actually removed.
    pub fn remove(&mut self, elements: &[ElementSnapshot]) -> Vec<CanonicalKey> {
        let mut removed = Vec::new();
        for el in elements {
            match el.kind() {
                ElementKind::Node => {
                    if let Some(id) = el.node_id() {
                        removed.extend(self.remove_node(&id));
                    }
                }
                ElementKind::Edge => {
                    let id = el.id().or_else(|| {
                        Some(derived_edge_id(&el.source()?, &el.target()?))
                    });
                    if let Some(id) = id {
                        if self.edges.remove(&id).is_some() {
                            removed.push(CanonicalKey::edge(&id));
                        }
                    }
                }
            }
        }
        self.reindex();
        removed
    }

    fn remove_node(&mut self, id: &str) -> Vec<CanonicalKey> {
        if self.nodes.remove(id).is_none() {
            return Vec::new();
        }
        let incident = self.incident_edges(id);
        for edge_id in &incident {
            self.edges.remove(edge_id);
        }
        let mut removed = vec![CanonicalKey::node(id)];
        removed.extend(incident.iter().map(|e| CanonicalKey::edge(e)));
        removed
    }

    /// Recompute weight ranges and parallel edge groups.
    fn reindex(&mut self) {
        self.node_weights = WeightRange::from_weights(
            self.nodes.values().filter_map(|n| attr_number(&n.attrs, "weight")),
        );
        self.edge_weights = WeightRange::from_weights(
            self.edges.values().filter_map(|e| attr_number(&e.attrs, "weight")),
        );

        let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for edge in self.edges.values() {
            let pair = if edge.source <= edge.target {
                (edge.source.clone(), edge.target.clone())
            } else {
                (edge.target.clone(), edge.source.clone())
            };
            groups.entry(pair).or_default().push(edge.id.clone());
        }
        for ids in groups.values() {
            for (index, id) in ids.iter().enumerate() {
                if let Some(edge) = self.edges.get_mut(id) {
                    edge.parallel_index = index;
                    edge.parallel_count = ids.len();
                }
            }
        }
    }

    /// Set a node or edge attribute. Weight changes rescale immediately.
    ///
    /// Returns `false` if no element has that key.
    pub fn set_attr(&mut self, element: &CanonicalKey, key: &str, value: Value) -> bool {
        let attrs = match element.kind() {
            ElementKind::Node => self.nodes.get_mut(element.id()).map(|n| &mut n.attrs),
            ElementKind::Edge => self.edges.get_mut(element.id()).map(|e| &mut e.attrs),
        };
        let Some(attrs) = attrs else {
            return false;
        };
        if matches!(key, "id" | "source" | "target") {
            return false;
        }
        attrs.insert(key.to_string(), value);
        if key == "weight" {
            self.reindex();
        }
        true
    }

    /// Set a node position.
    pub fn set_position(&mut self, id: &str, position: Position) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.position = Some(position);
                true
            }
            None => false,
        }
    }

    /// Whether the element with this key is present.
    pub fn contains(&self, key: &CanonicalKey) -> bool {
        match key.kind() {
            ElementKind::Node => self.nodes.contains_key(key.id()),
            ElementKind::Edge => self.edges.contains_key(key.id()),
        }
    }

    /// Key of the element with a bare id. A node wins over an edge sharing its id.
    pub fn lookup(&self, id: &str) -> Option<CanonicalKey> {
        if self.nodes.contains_key(id) {
            Some(CanonicalKey::node(id))
        } else if self.edges.contains_key(id) {
            Some(CanonicalKey::edge(id))
        } else {
            None
        }
    }

    /// Attributes of the element with this key.
    pub fn attrs(&self, key: &CanonicalKey) -> Option<&Attributes> {
        match key.kind() {
            ElementKind::Node => self.nodes.get(key.id()).map(|n| &n.attrs),
            ElementKind::Edge => self.edges.get(key.id()).map(|e| &e.attrs),
        }
    }

    /// Wire snapshot of the element with this key.
    pub fn snapshot(&self, key: &CanonicalKey) -> Option<ElementSnapshot> {
        match key.kind() {
            ElementKind::Node => self.nodes.get(key.id()).map(NodeRecord::snapshot),
            ElementKind::Edge => self.edges.get(key.id()).map(EdgeRecord::snapshot),
        }
    }

    /// Ids of edges touching a node.
    pub fn incident_edges(&self, node_id: &str) -> Vec<String> {
        self.edges
            .values()
            .filter(|e| e.source == node_id || e.target == node_id)
            .map(|e| e.id.clone())
            .collect()
    }

    /// All nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// All edges in id order.
    pub fn edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.edges.values()
    }

    /// Mutable node iteration.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut NodeRecord> {
        self.nodes.values_mut()
    }

    /// Node by id.
    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    /// Edge by id.
    pub fn edge(&self, id: &str) -> Option<&EdgeRecord> {
        self.edges.get(id)
    }

    /// All node ids.
    pub fn node_ids(&self) -> BTreeSet<String> {
        self.nodes.keys().cloned().collect()
    }

    /// All edge ids.
    pub fn edge_ids(&self) -> BTreeSet<String> {
        self.edges.keys().cloned().collect()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Current node weight range.
    pub fn node_weights(&self) -> WeightRange {
        self.node_weights
    }

    /// Current edge weight range.
    pub fn edge_weights(&self) -> WeightRange {
        self.edge_weights
    }

    /// Node diameter from its weight, on the given output range.
    pub fn node_diameter(&self, node: &NodeRecord, range: ScaleRange) -> f64 {
        self.node_weights.scale(node.weight(), range)
    }

    /// Edge width: explicit `width` clamped to `[0.5, 8]`, else scaled weight.
    pub fn edge_width(&self, edge: &EdgeRecord, range: ScaleRange) -> f64 {
        match attr_number(&edge.attrs, "width") {
            Some(w) => w.clamp(0.5, 8.0),
            None => self.edge_weights.scale(edge.weight(), range),
        }
    }
}
