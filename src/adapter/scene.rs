//! Backend C: 3D scene renderer with orbit camera controls.
//!
//! The scene runtime positions nodes itself, so every layout except `preset` is handed
//! over by name. Zoom is expressed against the camera distance captured at mount.

use serde::Serialize;

use crate::adapter::mounted::{edge_color, explicit_size, node_color, Backend, LayoutPlan, ViewModel, Viewport};
use crate::adapter::{AdapterError, BackendKind};
use crate::layout::{self, LayoutDescriptor, LayoutInput, LayoutKind};
use crate::normalize::{EdgeRecord, NodeRecord};
use crate::runtime::{EdgeStroke, NodeSprite, RenderSurface};
use crate::types::attr_number;

const NODE_SIZE: (f64, f64) = (8.0, 48.0);
const DEFAULT_NODE_SIZE: f64 = 14.0;
const DEFAULT_EDGE_COLOR: &str = "#b8b8b8";

/// Layouts the scene runtime knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SceneLayout {
    /// Concentric rings.
    Concentric,
    /// Circle.
    Circular,
    /// Top-down tree.
    TreeTopDown,
    /// Radial tree growing outwards.
    RadialOut,
    /// Grid without overlaps.
    NoOverlap,
    /// Force-directed.
    ForceDirected,
    /// ForceAtlas2, the fallback.
    ForceAtlas2,
}

impl SceneLayout {
    /// Map a host layout name.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "concentric" => Self::Concentric,
            "circle" | "circular" => Self::Circular,
            "breadthfirst" | "tree" | "dagre" => Self::TreeTopDown,
            "radial" => Self::RadialOut,
            "grid" | "nooverlap" => Self::NoOverlap,
            "cose" | "cola" | "fcose" | "force" | "force-directed" | "forcedirected" | "spring" => {
                Self::ForceDirected
            }
            _ => Self::ForceAtlas2,
        }
    }

    /// Runtime-side identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Concentric => "concentric2d",
            Self::Circular => "circular2d",
            Self::TreeTopDown => "treeTd2d",
            Self::RadialOut => "radialOut2d",
            Self::NoOverlap => "nooverlap2d",
            Self::ForceDirected => "forceDirected2d",
            Self::ForceAtlas2 => "forceatlas2",
        }
    }
}

impl std::fmt::Display for SceneLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
pub(crate) struct SceneBackend {
    /// Camera distance at mount; zoom 1.
    base_distance: Option<f64>,
    /// Zoom level kept while no camera controls exist.
    logical_zoom: f64,
    layout: Option<SceneLayout>,
}

impl Default for SceneBackend {
    fn default() -> Self {
        Self { base_distance: None, logical_zoom: 1.0, layout: None }
    }
}

fn valid_level(level: f64) -> bool {
    level.is_finite() && level > 0.0
}

impl Backend for SceneBackend {
    const KIND: BackendKind = BackendKind::Scene;

    fn attach(&mut self, surface: &dyn RenderSurface) {
        self.base_distance = surface
            .camera_controls()
            .map(|c| c.distance)
            .filter(|d| d.is_finite() && *d > 0.0);
    }

    fn sprite(&self, model: &ViewModel, node: &NodeRecord) -> NodeSprite {
        let size = match explicit_size(node) {
            Some(size) => size.clamp(NODE_SIZE.0, NODE_SIZE.1),
            None if attr_number(&node.attrs, "weight").is_some() => model
                .graph
                .node_diameter(node, model.config.node_diameter)
                .clamp(NODE_SIZE.0, NODE_SIZE.1),
            None => DEFAULT_NODE_SIZE,
        };
        NodeSprite {
            id: node.id.clone(),
            position: node.position.unwrap_or_default(),
            size,
            color: node_color(node),
            label: node.label(),
            selected: model.node_selected(node),
        }
    }

    fn stroke(&self, model: &ViewModel, edge: &EdgeRecord) -> EdgeStroke {
        EdgeStroke {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            width: model.graph.edge_width(edge, model.config.edge_width),
            color: edge_color(edge, DEFAULT_EDGE_COLOR),
            label: edge.label(),
            label_offset: 0.0,
            curvature: 0.0,
            directed: edge.is_directed(),
            selected: model.edge_selected(edge),
        }
    }

    fn layout_plan(
        &mut self,
        kind: LayoutKind,
        descriptor: &LayoutDescriptor,
        model: &ViewModel,
        viewport: &Viewport,
    ) -> LayoutPlan {
        if kind == LayoutKind::Preset {
            self.layout = None;
            let input = LayoutInput::from_graph(&model.graph);
            return LayoutPlan::Immediate(layout::compute(kind, &input, viewport.size()));
        }
        let layout = SceneLayout::from_name(&descriptor.name);
        self.layout = Some(layout);
        LayoutPlan::Delegated(layout.as_str().to_string())
    }

    fn delegated_layout(&self) -> Option<String> {
        self.layout.map(|l| l.as_str().to_string())
    }

    fn zoom(&self, _viewport: &Viewport, surface: Option<&dyn RenderSurface>) -> f64 {
        let controls = surface.and_then(|s| s.camera_controls());
        match (controls, self.base_distance) {
            (Some(controls), Some(base)) if controls.distance > 0.0 => base / controls.distance,
            _ => self.logical_zoom,
        }
    }

    fn set_zoom(
        &mut self,
        level: f64,
        _viewport: &mut Viewport,
        surface: &mut Option<Box<dyn RenderSurface>>,
    ) -> Result<(), AdapterError> {
        if !valid_level(level) {
            return Ok(());
        }
        let Some(surface) = surface.as_mut() else {
            self.logical_zoom = level;
            return Ok(());
        };
        match (surface.camera_controls(), self.base_distance) {
            (Some(controls), Some(base)) => {
                surface.set_camera_distance(controls.clamp(base / level))?;
            }
            _ => self.logical_zoom = level,
        }
        Ok(())
    }

    fn on_fit(
        &mut self,
        _viewport: &Viewport,
        surface: &mut Option<Box<dyn RenderSurface>>,
    ) -> Result<(), AdapterError> {
        if let (Some(surface), Some(base)) = (surface.as_mut(), self.base_distance) {
            if let Some(controls) = surface.camera_controls() {
                surface.set_camera_distance(controls.clamp(base))?;
            }
        }
        self.logical_zoom = 1.0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_name_mapping() {
        assert_eq!(SceneLayout::from_name("circle"), SceneLayout::Circular);
        assert_eq!(SceneLayout::from_name("breadthfirst"), SceneLayout::TreeTopDown);
        assert_eq!(SceneLayout::from_name("radial"), SceneLayout::RadialOut);
        assert_eq!(SceneLayout::from_name("grid"), SceneLayout::NoOverlap);
        assert_eq!(SceneLayout::from_name("COSE"), SceneLayout::ForceDirected);
        assert_eq!(SceneLayout::from_name("anything"), SceneLayout::ForceAtlas2);
    }

    #[test]
    fn test_logical_zoom_without_controls() {
        let mut backend = SceneBackend::default();
        let mut viewport = Viewport::new(Default::default());
        backend.set_zoom(2.5, &mut viewport, &mut None).unwrap();
        assert_eq!(backend.zoom(&viewport, None), 2.5);
        backend.set_zoom(-1.0, &mut viewport, &mut None).unwrap();
        assert_eq!(backend.zoom(&viewport, None), 2.5);
        backend.set_zoom(0.0, &mut viewport, &mut None).unwrap();
        assert_eq!(backend.zoom(&viewport, None), 2.5);
    }
}
