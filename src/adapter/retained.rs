//! Backend A: retained-mode 2D renderer.
//!
//! Keeps inbound positions as they are, labels parallel edges with symmetric offsets
//! instead of curving them, and computes every layout synchronously.

use crate::adapter::mounted::{edge_color, explicit_size, node_color, Backend, LayoutPlan, ViewModel, Viewport};
use crate::adapter::BackendKind;
use crate::layout::{self, LayoutDescriptor, LayoutInput, LayoutKind};
use crate::normalize::{parallel_label_offset, EdgeRecord, NodeRecord};
use crate::runtime::{EdgeStroke, NodeSprite};
use crate::types::attr_str;

const DEFAULT_EDGE_COLOR: &str = "#9aa0a6";

#[derive(Debug, Default)]
pub(crate) struct RetainedBackend;

impl Backend for RetainedBackend {
    const KIND: BackendKind = BackendKind::Retained;

    fn sprite(&self, model: &ViewModel, node: &NodeRecord) -> NodeSprite {
        NodeSprite {
            id: node.id.clone(),
            position: node.position.unwrap_or_default(),
            size: explicit_size(node)
                .map(|s| model.config.node_diameter.clamp(s))
                .unwrap_or_else(|| model.graph.node_diameter(node, model.config.node_diameter)),
            color: node_color(node),
            label: node.label(),
            selected: model.node_selected(node),
        }
    }

    fn stroke(&self, model: &ViewModel, edge: &EdgeRecord) -> EdgeStroke {
        let fallback = attr_str(&model.style, "edgeColor").unwrap_or(DEFAULT_EDGE_COLOR);
        EdgeStroke {
            id: edge.id.clone(),
            source: edge.source.clone(),
            target: edge.target.clone(),
            width: model.graph.edge_width(edge, model.config.edge_width),
            color: edge_color(edge, fallback),
            label: edge.label(),
            label_offset: parallel_label_offset(
                edge.parallel_index,
                edge.parallel_count,
                model.config.label_spread,
            ),
            curvature: 0.0,
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
        LayoutPlan::Immediate(layout::compute(kind, &input, viewport.size()))
    }
}
