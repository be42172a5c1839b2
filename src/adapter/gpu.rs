//! Backend B: GPU-accelerated 2D renderer over the normalized graph.
//!
//! Every node must carry a finite position before it reaches the GPU, so missing or
//! broken coordinates are replaced with the deterministic fallback from the id hash.
//! Force-directed layouts run on a worker and only their final positions are applied.

use crate::adapter::mounted::{edge_color, node_color, Backend, LayoutPlan, ViewModel, Viewport};
use crate::adapter::{AdapterError, BackendKind};
use crate::canonical::fallback_position;
use crate::layout::{self, LayoutDescriptor, LayoutInput, LayoutKind};
use crate::normalize::{EdgeRecord, NodeRecord};
use crate::runtime::{EdgeStroke, NodeSprite, RenderSurface};
use crate::types::Position;

const NODE_RADIUS: (f64, f64) = (6.0, 30.0);
const EDGE_WIDTH: (f64, f64) = (0.75, 6.0);
const PAIR_CURVATURE: f64 = 0.7;
const BUNDLE_CURVATURE: f64 = 0.45;
const SELF_LOOP_CURVATURE: f64 = 2.5;
const RATIO_RANGE: (f64, f64) = (0.0001, 100.0);
const DEFAULT_EDGE_COLOR: &str = "#cccccc";

/// Curvature for the `index`-th of `count` parallel edges.
///
/// Offsets from the bundle center are rounded away from zero, so a pair bends to
/// opposite sides and the middle edge of an odd bundle stays straight.
pub fn parallel_curvature(index: usize, count: usize) -> f64 {
    if count < 2 {
        return 0.0;
    }
    let base = if count == 2 { PAIR_CURVATURE } else { BUNDLE_CURVATURE };
    let offset = index as f64 - (count as f64 - 1.0) / 2.0;
    let step = if offset > 0.0 {
        offset.ceil()
    } else if offset < 0.0 {
        offset.floor()
    } else {
        0.0
    };
    step * base
}

#[derive(Debug)]
pub(crate) struct GpuBackend {
    /// Camera ratio: visible graph units per pixel. Zoom is its inverse.
    ratio: f64,
}

impl Default for GpuBackend {
    fn default() -> Self {
        Self { ratio: 1.0 }
    }
}

impl Backend for GpuBackend {
    const KIND: BackendKind = BackendKind::Gpu;

    fn prepare(&mut self, model: &mut ViewModel) {
        let mut coerced = 0usize;
        for node in model.graph.nodes_mut() {
            if !node.position.is_some_and(|p| p.is_finite()) {
                node.position = Some(fallback_position(&node.id));
                coerced += 1;
            }
        }
        if coerced > 0 {
            tracing::debug!(coerced, "Assigned fallback positions");
        }
    }

    fn sprite(&self, model: &ViewModel, node: &NodeRecord) -> NodeSprite {
        let diameter = model.graph.node_diameter(node, model.config.node_diameter);
        let radius = (diameter / 2.0).clamp(NODE_RADIUS.0, NODE_RADIUS.1);
        NodeSprite {
            id: node.id.clone(),
            position: node
                .position
                .filter(Position::is_finite)
                .unwrap_or_else(|| fallback_position(&node.id)),
            size: radius * 2.0,
            color: node_color(node),
            label: node.label(),
            selected: model.node_selected(node),
        }
    }

    fn stroke(&self, model: &ViewModel, edge: &EdgeRecord) -> EdgeStroke {
        let curvature = if edge.is_self_loop() && edge.parallel_count <= 1 {
            SELF_LOOP_CURVATURE
        } else {
            parallel_curvature(edge.parallel_index, edge.parallel_count)
        };
        EdgeStroke {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            width: model
                .graph
                .edge_width(edge, model.config.edge_width)
                .clamp(EDGE_WIDTH.0, EDGE_WIDTH.1),
            color: edge_color(edge, DEFAULT_EDGE_COLOR),
            label: edge.label(),
            label_offset: 0.0,
            curvature,
            directed: edge.is_directed(),
            selected: model.edge_selected(edge),
        }
    }

    fn layout_plan(
        &mut self,
        kind: LayoutKind,
        _descriptor: &LayoutDescriptor,
        model: &ViewModel,
        viewport: &Viewport,
    ) -> LayoutPlan {
        let input = LayoutInput::from_graph(&model.graph);
        if kind.is_iterative() && model.graph.node_count() >= model.config.worker_min_nodes {
            LayoutPlan::Worker(kind, input)
        } else {
            LayoutPlan::Immediate(layout::compute(kind, &input, viewport.size()))
        }
    }

    fn zoom(&self, _viewport: &Viewport, _surface: Option<&dyn RenderSurface>) -> f64 {
        1.0 / self.ratio
    }

    fn set_zoom(
        &mut self,
        level: f64,
        _viewport: &mut Viewport,
        _surface: &mut Option<Box<dyn RenderSurface>>,
    ) -> Result<(), AdapterError> {
        if level.is_finite() && level > 0.0 {
            self.ratio = (1.0 / level).clamp(RATIO_RANGE.0, RATIO_RANGE.1);
        }
        Ok(())
    }

    fn on_fit(
        &mut self,
        viewport: &Viewport,
        _surface: &mut Option<Box<dyn RenderSurface>>,
    ) -> Result<(), AdapterError> {
        self.ratio = (1.0 / viewport.zoom).clamp(RATIO_RANGE.0, RATIO_RANGE.1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use crate::normalize::AttributedGraph;
    use crate::timeline::HiddenSet;
    use crate::types::{Attributes, ElementSnapshot};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn model(elements: &[ElementSnapshot]) -> ViewModel {
        ViewModel {
            graph: AttributedGraph::from_elements(elements).0,
            selected: BTreeSet::new(),
            hidden: HiddenSet::new(),
            manual_hidden: HiddenSet::new(),
            config: ViewConfig::default(),
            style: Attributes::new(),
        }
    }

    #[test]
    fn test_parallel_curvature() {
        assert_eq!(parallel_curvature(0, 1), 0.0);
        assert_eq!((parallel_curvature(0, 2), parallel_curvature(1, 2)), (-0.7, 0.7));
        assert_eq!(
            (0..3).map(|i| parallel_curvature(i, 3)).collect::<Vec<_>>(),
            vec![-0.45, 0.0, 0.45]
        );
        assert_eq!(parallel_curvature(0, 4), -0.9);
    }

    #[test]
    fn test_self_loop_and_clamps() {
        let m = model(&[
            ElementSnapshot::node("a").with_attr("weight", 1),
            ElementSnapshot::node("b").with_attr("weight", 100),
            ElementSnapshot::edge_with_id("loop", "a", "a").with_attr("width", 8),
        ]);
        let stroke = GpuBackend::default().stroke(&m, m.graph.edge("loop").unwrap());
        assert_eq!(stroke.curvature, 2.5);
        assert_eq!(stroke.width, 6.0);

        let big = GpuBackend::default().sprite(&m, m.graph.node("b").unwrap());
        assert_eq!(big.size, 60.0);
        let small = GpuBackend::default().sprite(&m, m.graph.node("a").unwrap());
        assert_eq!(small.size, 12.0);
    }

    #[test]
    fn test_zoom_is_inverse_ratio() {
        let mut backend = GpuBackend::default();
        let mut viewport = Viewport::new(Default::default());
        backend.set_zoom(4.0, &mut viewport, &mut None).unwrap();
        assert_eq!(backend.zoom(&viewport, None), 4.0);
        backend.set_zoom(f64::NAN, &mut viewport, &mut None).unwrap();
        assert_eq!(backend.zoom(&viewport, None), 4.0);
    }

    proptest! {
        #[test]
        fn prop_prepare_leaves_only_finite_positions(
            xs in proptest::collection::vec(prop_oneof![
                Just(f64::NAN),
                Just(f64::INFINITY),
                -1.0e6..1.0e6f64,
            ], 1..20)
        ) {
            let elements: Vec<ElementSnapshot> = xs
                .iter()
                .enumerate()
                .map(|(i, x)| ElementSnapshot::node(format!("n{i}")).at(*x, 0.0))
                .collect();
            let mut m = model(&elements);
            GpuBackend::default().prepare(&mut m);
            for node in m.graph.nodes() {
                prop_assert!(node.position.is_some_and(|p| p.is_finite()));
            }
        }
    }
}
