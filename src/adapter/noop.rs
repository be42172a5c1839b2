//! The adapter a mount degrades to when its runtime cannot be loaded.

use serde_json::Value;

use crate::adapter::selector::Selector;
use crate::adapter::{AdapterError, AdapterStats, BackendKind, ElementClass, GraphAdapter};
use crate::canonical::CanonicalKey;
use crate::events::{EventHandler, EventKind, ListenerId};
use crate::layout::{LayoutCallback, LayoutDescriptor, LayoutStatus};
use crate::normalize::{AttributedGraph, NormalizeReport};
use crate::runtime::CameraControls;
use crate::selection::Origin;
use crate::timeline::HiddenSet;
use crate::types::{Attributes, ElementSnapshot};

/// Succeeds at everything and renders nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAdapter;

impl GraphAdapter for NoopAdapter {
    fn kind(&self) -> Option<BackendKind> {
        None
    }

    fn node_ids(&self) -> Result<Vec<String>, AdapterError> {
        Ok(Vec::new())
    }

    fn edge_ids(&self) -> Result<Vec<String>, AdapterError> {
        Ok(Vec::new())
    }

    fn lookup(&self, _id: &str) -> Result<Option<CanonicalKey>, AdapterError> {
        Ok(None)
    }

    fn element_data(&self, _element: &CanonicalKey) -> Result<Option<Attributes>, AdapterError> {
        Ok(None)
    }

    fn set_element_data(
        &self,
        _element: &CanonicalKey,
        _key: &str,
        _value: Value,
    ) -> Result<bool, AdapterError> {
        Ok(false)
    }

    fn has_class(&self, _element: &CanonicalKey, _class: ElementClass) -> Result<bool, AdapterError> {
        Ok(false)
    }

    fn select(&self, _element: &CanonicalKey, _origin: Origin) -> Result<bool, AdapterError> {
        Ok(false)
    }

    fn unselect(&self, _element: &CanonicalKey, _origin: Origin) -> Result<bool, AdapterError> {
        Ok(false)
    }

    fn unselect_all(&self) -> Result<usize, AdapterError> {
        Ok(0)
    }

    fn add(&self, _elements: &[ElementSnapshot]) -> Result<NormalizeReport, AdapterError> {
        Ok(NormalizeReport::default())
    }

    fn remove(&self, _elements: &[ElementSnapshot]) -> Result<Vec<CanonicalKey>, AdapterError> {
        Ok(Vec::new())
    }

    fn filter(&self, _selector: &Selector) -> Result<Vec<CanonicalKey>, AdapterError> {
        Ok(Vec::new())
    }

    fn run_layout(
        &self,
        _descriptor: &LayoutDescriptor,
        on_stop: Option<LayoutCallback>,
    ) -> Result<LayoutStatus, AdapterError> {
        if let Some(callback) = on_stop {
            callback();
        }
        Ok(LayoutStatus::Skipped)
    }

    fn fit(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn center(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    fn zoom(&self) -> Result<f64, AdapterError> {
        Ok(1.0)
    }

    fn set_zoom(&self, _level: f64) -> Result<f64, AdapterError> {
        Ok(1.0)
    }

    fn resize(&self, _width: f64, _height: f64) -> Result<(), AdapterError> {
        Ok(())
    }

    fn on(&self, _kind: EventKind, _handler: EventHandler) -> Result<ListenerId, AdapterError> {
        Ok(ListenerId(0))
    }

    fn off(&self, _kind: EventKind, _id: ListenerId) -> Result<bool, AdapterError> {
        Ok(false)
    }

    fn apply_hidden(&self, _hidden: &HiddenSet) -> Result<(), AdapterError> {
        Ok(())
    }

    fn manual_hidden(&self) -> Result<HiddenSet, AdapterError> {
        Ok(HiddenSet::new())
    }

    fn graph_snapshot(&self) -> Result<AttributedGraph, AdapterError> {
        Ok(AttributedGraph::new())
    }

    fn camera_controls(&self) -> Result<Option<CameraControls>, AdapterError> {
        Ok(None)
    }

    fn stats(&self) -> AdapterStats {
        AdapterStats::default()
    }

    fn is_live(&self) -> bool {
        true
    }

    fn destroy(&self) {}
}
