//! Layout descriptors and engines.
//!
//! Backends negotiate positions; the physics live here. Preset layouts keep inbound
//! positions, geometric layouts are closed-form, and force-directed layouts run a
//! `force_graph` simulation that may be moved onto a blocking worker by the caller.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use force_graph::{EdgeData, ForceGraph, NodeData, SimulationParameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::fallback_position;
use crate::config::ViewportSize;
use crate::normalize::AttributedGraph;
use crate::types::{attr_number, Attributes, Position};

/// Simulation time step per iteration.
const FORCE_STEP: f32 = 0.035;

/// Ring spacing for concentric layouts.
const RING_SPACING: f64 = 60.0;

/// Upper bound on force-directed steps, whatever the descriptor asks for.
pub const MAX_LAYOUT_ITERATIONS: usize = 10_000;

/// Error type for layout descriptors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayoutError {
    /// A parameter had an unusable value.
    #[error("Invalid layout parameter {name}: {value}")]
    InvalidParam {
        /// Parameter name.
        name: String,
        /// Offending value.
        value: String,
    },
}

/// `{name, ...params}` as supplied by the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutDescriptor {
    /// Layout name (`preset`, `grid`, `circle`, `concentric`, `cose`, ...).
    #[serde(default)]
    pub name: String,
    /// Remaining parameters.
    #[serde(flatten)]
    pub params: Attributes,
}

impl LayoutDescriptor {
    /// Descriptor with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), params: Attributes::new() }
    }

    /// Keep inbound positions.
    pub fn preset() -> Self {
        Self::new("preset")
    }

    /// Builder: set a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// Resolved layout algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LayoutKind {
    /// Keep positions as given.
    Preset,
    /// Row-major grid.
    Grid,
    /// Evenly spaced circle.
    Circle,
    /// Rings ordered by weight, heaviest in the middle.
    Concentric,
    /// Force-directed simulation.
    ForceDirected {
        /// Simulation steps.
        iterations: usize,
    },
}

impl LayoutKind {
    /// Resolve a descriptor. Unknown names fall back to force-directed.
    ///
    /// Iterations come from `iterations`, else `maxSimulationTime / 5` (at least 100),
    /// else `default_iterations`, and are capped at [`MAX_LAYOUT_ITERATIONS`].
    pub fn from_descriptor(
        descriptor: &LayoutDescriptor,
        default_iterations: usize,
    ) -> Result<Self, LayoutError> {
        let kind = match descriptor.name.trim().to_lowercase().as_str() {
            "" | "preset" | "null" => Self::Preset,
            "grid" => Self::Grid,
            "circle" | "circular" => Self::Circle,
            "concentric" => Self::Concentric,
            _ => {
                let requested = iterations(descriptor, default_iterations)?;
                if requested > MAX_LAYOUT_ITERATIONS {
                    tracing::debug!(
                        layout = %descriptor.name,
                        requested,
                        max = MAX_LAYOUT_ITERATIONS,
                        "Capping layout iterations"
                    );
                }
                Self::ForceDirected { iterations: requested.min(MAX_LAYOUT_ITERATIONS) }
            }
        };
        Ok(kind)
    }

    /// Whether this layout is expensive enough to run off the calling thread.
    pub fn is_iterative(&self) -> bool {
        matches!(self, Self::ForceDirected { .. })
    }
}

fn iterations(descriptor: &LayoutDescriptor, default: usize) -> Result<usize, LayoutError> {
    let invalid = |name: &str| LayoutError::InvalidParam {
        name: name.to_string(),
        value: descriptor.params.get(name).map(Value::to_string).unwrap_or_default(),
    };
    if descriptor.params.contains_key("iterations") {
        let n = attr_number(&descriptor.params, "iterations").ok_or_else(|| invalid("iterations"))?;
        if n < 1.0 {
            return Err(invalid("iterations"));
        }
        return Ok(n as usize);
    }
    if descriptor.params.contains_key("maxSimulationTime") {
        let ms = attr_number(&descriptor.params, "maxSimulationTime")
            .filter(|ms| *ms >= 0.0)
            .ok_or_else(|| invalid("maxSimulationTime"))?;
        return Ok(((ms / 5.0) as usize).max(100));
    }
    Ok(default)
}

/// Positions by node id.
pub type Positions = BTreeMap<String, Position>;

/// Node data a layout needs, detached from the view state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutInput {
    /// `(id, current position, weight)` in id order.
    pub nodes: Vec<(String, Option<Position>, f64)>,
    /// `(source, target)` pairs.
    pub edges: Vec<(String, String)>,
}

impl LayoutInput {
    /// Snapshot a graph.
    pub fn from_graph(graph: &AttributedGraph) -> Self {
        Self {
            nodes: graph
                .nodes()
                .map(|n| (n.id.clone(), n.position, n.weight()))
                .collect(),
            edges: graph
                .edges()
                .map(|e| (e.source.clone(), e.target.clone()))
                .collect(),
        }
    }
}

/// Run a layout.
pub fn compute(kind: LayoutKind, input: &LayoutInput, viewport: ViewportSize) -> Positions {
    match kind {
        LayoutKind::Preset => input
            .nodes
            .iter()
            .filter_map(|(id, pos, _)| pos.filter(Position::is_finite).map(|p| (id.clone(), p)))
            .collect(),
        LayoutKind::Grid => grid(input, viewport),
        LayoutKind::Circle => circle(input, viewport),
        LayoutKind::Concentric => concentric(input, viewport),
        LayoutKind::ForceDirected { iterations } => force_directed(input, iterations),
    }
}

fn grid(input: &LayoutInput, viewport: ViewportSize) -> Positions {
    let n = input.nodes.len();
    if n == 0 {
        return Positions::new();
    }
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let cell_w = viewport.width / cols as f64;
    let cell_h = viewport.height / rows as f64;
    input
        .nodes
        .iter()
        .enumerate()
        .map(|(i, (id, _, _))| {
            let (r, c) = (i / cols, i % cols);
            (id.clone(), Position::new((c as f64 + 0.5) * cell_w, (r as f64 + 0.5) * cell_h))
        })
        .collect()
}

fn circle(input: &LayoutInput, viewport: ViewportSize) -> Positions {
    let n = input.nodes.len();
    let (cx, cy) = (viewport.width / 2.0, viewport.height / 2.0);
    let radius = (viewport.width.min(viewport.height) / 2.0 - 30.0).max(RING_SPACING);
    input
        .nodes
        .iter()
        .enumerate()
        .map(|(i, (id, _, _))| {
            let angle = i as f64 * 2.0 * PI / n as f64;
            (id.clone(), Position::new(cx + radius * angle.cos(), cy + radius * angle.sin()))
        })
        .collect()
}

fn concentric(input: &LayoutInput, viewport: ViewportSize) -> Positions {
    let (cx, cy) = (viewport.width / 2.0, viewport.height / 2.0);
    let mut order: Vec<&(String, Option<Position>, f64)> = input.nodes.iter().collect();
    order.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));

    let mut positions = Positions::new();
    let (mut ring, mut slot, mut capacity) = (0usize, 0usize, 1usize);
    for (id, _, _) in order {
        let radius = ring as f64 * RING_SPACING;
        let angle = slot as f64 * 2.0 * PI / capacity as f64;
        positions.insert(id.clone(), Position::new(cx + radius * angle.cos(), cy + radius * angle.sin()));
        slot += 1;
        if slot == capacity {
            ring += 1;
            slot = 0;
            capacity = ring * 6;
        }
    }
    positions
}

/// Force-directed layout on `force_graph`.
///
/// Nodes without a finite position start from their deterministic fallback, so two
/// runs over the same input produce the same result.
pub fn force_directed(input: &LayoutInput, iterations: usize) -> Positions {
    if input.nodes.is_empty() {
        return Positions::new();
    }
    let mut graph: ForceGraph<usize, ()> = ForceGraph::new(SimulationParameters {
        force_charge: 150.0,
        force_spring: 0.05,
        force_max: 100.0,
        node_speed: 3000.0,
        damping_factor: 0.9,
    });

    let mut index = BTreeMap::new();
    for (i, (id, pos, _)) in input.nodes.iter().enumerate() {
        let start = pos.filter(Position::is_finite).unwrap_or_else(|| fallback_position(id));
        let idx = graph.add_node(NodeData {
            x: start.x as f32,
            y: start.y as f32,
            mass: 10.0,
            is_anchor: false,
            user_data: i,
        });
        index.insert(id.as_str(), idx);
    }
    for (source, target) in &input.edges {
        if let (Some(&s), Some(&t)) = (index.get(source.as_str()), index.get(target.as_str())) {
            if s != t {
                graph.add_edge(s, t, EdgeData::default());
            }
        }
    }

    for _ in 0..iterations {
        graph.update(FORCE_STEP);
    }

    let mut positions = Positions::new();
    graph.visit_nodes(|node| {
        let (x, y) = (node.x() as f64, node.y() as f64);
        let id = &input.nodes[node.data.user_data].0;
        let p = if x.is_finite() && y.is_finite() {
            Position::new(x, y)
        } else {
            fallback_position(id)
        };
        positions.insert(id.clone(), p);
    });
    positions
}

/// How a layout run ended (or did not yet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutStatus {
    /// Positions were applied before returning.
    Completed,
    /// A worker is computing; positions arrive later.
    Running,
    /// The renderer owns positioning for this layout.
    Delegated,
    /// Nothing ran (no-op or destroyed view).
    #[default]
    Skipped,
}

/// Called once positions are applied.
pub type LayoutCallback = Box<dyn FnOnce() + Send + 'static>;
