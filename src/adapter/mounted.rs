//! Shared adapter machinery.
//!
//! Every backend keeps the same view state (graph, selection, visibility, viewport,
//! listeners) and differs only in how it turns that state into sprites and strokes, how
//! it negotiates layouts and how its camera zooms. Those differences live behind the
//! crate-private [`Backend`] trait; [`Mounted`] owns the state and implements
//! [`GraphAdapter`] once for all of them.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;

use crate::adapter::selector::Selector;
use crate::adapter::{AdapterError, AdapterStats, BackendKind, ElementClass, GraphAdapter, MountConfig};
use crate::canonical::{canonical_key, string_to_color, CanonicalKey};
use crate::config::{ViewConfig, ViewportSize};
use crate::events::{dispatch, EventHandler, EventKind, ListenerId, Listeners, ViewEvent};
use crate::layout::{
    self, LayoutCallback, LayoutDescriptor, LayoutInput, LayoutKind, LayoutStatus, Positions,
};
use crate::normalize::{AttributedGraph, EdgeRecord, NodeRecord, NormalizeReport};
use crate::runtime::{Camera, CameraControls, EdgeStroke, Frame, NodeSprite, RenderSurface};
use crate::scheduler::{Executor, SinglePending};
use crate::selection::{EchoSuppressor, Origin, RemoteApply, SelectionManager, Subscription};
use crate::timeline::HiddenSet;
use crate::types::{attr_number, attr_str, Attributes, ElementSnapshot, Position};

/// Zoom bounds for 2D viewports.
pub(crate) const MIN_ZOOM: f64 = 0.05;
pub(crate) const MAX_ZOOM: f64 = 20.0;

/// What a backend decided to do with a layout request.
pub(crate) enum LayoutPlan {
    /// Positions are ready.
    Immediate(Positions),
    /// Positions must be computed off the calling thread.
    Worker(LayoutKind, LayoutInput),
    /// The renderer lays out by itself under this name.
    Delegated(String),
}

/// Element state shared by every backend.
///
/// Selection and visibility are keyed by kind, so a node and an edge that share an id
/// never share flags.
#[derive(Debug, Clone)]
pub(crate) struct ViewModel {
    pub graph: AttributedGraph,
    pub selected: BTreeSet<CanonicalKey>,
    pub hidden: HiddenSet,
    pub manual_hidden: HiddenSet,
    pub config: ViewConfig,
    pub style: Attributes,
}

impl ViewModel {
    pub fn is_hidden(&self, key: &CanonicalKey) -> bool {
        self.hidden.contains(key) || self.manual_hidden.contains(key)
    }

    pub fn node_hidden(&self, id: &str) -> bool {
        self.hidden.contains_node(id) || self.manual_hidden.contains_node(id)
    }

    pub fn is_selected(&self, key: &CanonicalKey) -> bool {
        self.selected.contains(key)
    }

    pub fn node_selected(&self, node: &NodeRecord) -> bool {
        self.selected.contains(&node.key())
    }

    pub fn edge_selected(&self, edge: &EdgeRecord) -> bool {
        self.selected.contains(&edge.key())
    }

    /// An edge is drawn only when it and both endpoints are visible.
    pub fn edge_visible(&self, edge: &EdgeRecord) -> bool {
        let own = self.hidden.contains_edge(&edge.id) || self.manual_hidden.contains_edge(&edge.id);
        !own && !self.node_hidden(&edge.source) && !self.node_hidden(&edge.target)
    }
}

/// 2D viewport: size, center and zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Viewport {
    pub width: f64,
    pub height: f64,
    pub center: Position,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(size: ViewportSize) -> Self {
        Self {
            width: size.width,
            height: size.height,
            center: Position::new(size.width / 2.0, size.height / 2.0),
            zoom: 1.0,
        }
    }

    pub fn size(&self) -> ViewportSize {
        ViewportSize { width: self.width, height: self.height }
    }

    /// Fit visible, positioned nodes into the viewport. No-op without positions.
    pub fn fit(&mut self, model: &ViewModel, padding: f64) {
        let Some((min, max)) = visible_bounds(model) else {
            return;
        };
        let dx = (max.x - min.x).max(1.0);
        let dy = (max.y - min.y).max(1.0);
        let zoom = ((self.width - padding * 2.0) / dx).min((self.height - padding * 2.0) / dy);
        self.center = Position::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    /// Center on visible, positioned nodes without changing zoom.
    pub fn center_on(&mut self, model: &ViewModel) {
        if let Some((min, max)) = visible_bounds(model) {
            self.center = Position::new((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);
        }
    }
}

fn visible_bounds(model: &ViewModel) -> Option<(Position, Position)> {
    model
        .graph
        .nodes()
        .filter(|n| !model.node_hidden(&n.id))
        .filter_map(|n| n.position.filter(Position::is_finite))
        .fold(None, |acc, p| match acc {
            None => Some((p, p)),
            Some((min, max)) => Some((
                Position::new(min.x.min(p.x), min.y.min(p.y)),
                Position::new(max.x.max(p.x), max.y.max(p.y)),
            )),
        })
}

/// Explicit `color`, else a color derived from the id.
pub(crate) fn node_color(node: &NodeRecord) -> String {
    attr_str(&node.attrs, "color")
        .map(str::to_string)
        .unwrap_or_else(|| string_to_color(&node.id))
}

/// Explicit `color`, else `fallback`.
pub(crate) fn edge_color(edge: &EdgeRecord, fallback: &str) -> String {
    attr_str(&edge.attrs, "color").unwrap_or(fallback).to_string()
}

/// Backend-specific drawing, layout and camera behavior.
pub(crate) trait Backend: Send + 'static {
    const KIND: BackendKind;

    /// Adjust the model after its elements change.
    fn prepare(&mut self, _model: &mut ViewModel) {}

    /// Bind to a freshly loaded surface.
    fn attach(&mut self, _surface: &dyn RenderSurface) {}

    fn sprite(&self, model: &ViewModel, node: &NodeRecord) -> NodeSprite;

    fn stroke(&self, model: &ViewModel, edge: &EdgeRecord) -> EdgeStroke;

    fn layout_plan(
        &mut self,
        kind: LayoutKind,
        descriptor: &LayoutDescriptor,
        model: &ViewModel,
        viewport: &Viewport,
    ) -> LayoutPlan;

    /// Renderer-side layout currently running.
    fn delegated_layout(&self) -> Option<String> {
        None
    }

    fn zoom(&self, viewport: &Viewport, _surface: Option<&dyn RenderSurface>) -> f64 {
        viewport.zoom
    }

    /// Set the zoom level. Invalid levels leave the zoom unchanged.
    fn set_zoom(
        &mut self,
        level: f64,
        viewport: &mut Viewport,
        _surface: &mut Option<Box<dyn RenderSurface>>,
    ) -> Result<(), AdapterError> {
        if level.is_finite() && level > 0.0 {
            viewport.zoom = level.clamp(MIN_ZOOM, MAX_ZOOM);
        }
        Ok(())
    }

    /// Called after the viewport was fitted.
    fn on_fit(
        &mut self,
        _viewport: &Viewport,
        _surface: &mut Option<Box<dyn RenderSurface>>,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    fn camera(&self, viewport: &Viewport, surface: Option<&dyn RenderSurface>) -> Camera {
        Camera { center: viewport.center, zoom: self.zoom(viewport, surface) }
    }
}

struct MountState<B> {
    backend: B,
    model: ViewModel,
    viewport: Viewport,
    surface: Option<Box<dyn RenderSurface>>,
    echo: EchoSuppressor,
    listeners: Listeners,
    destroyed: bool,
    sequence: u64,
    layout_generation: u64,
    frames_drawn: u64,
    layout_runs: u64,
    present_failures: u64,
}

struct MountShared<B> {
    state: Mutex<MountState<B>>,
    frames: SinglePending,
    selection: Option<SelectionManager>,
    subscription: Mutex<Option<Subscription>>,
    layout_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    runtime: Option<tokio::runtime::Handle>,
}

/// A mounted backend.
pub(crate) struct Mounted<B> {
    shared: Arc<MountShared<B>>,
}

impl<B> Clone for Mounted<B> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<B: Backend> Mounted<B> {
    /// Build the view over a loaded surface, run the mount layout and draw once.
    pub fn mount(
        mut backend: B,
        surface: Box<dyn RenderSurface>,
        mount: &MountConfig,
        config: ViewConfig,
        selection: Option<SelectionManager>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let (graph, report) = AttributedGraph::from_elements(&mount.elements);

        let viewport = Viewport::new(mount.viewport_size(config.viewport));
        let mut model = ViewModel {
            graph,
            selected: BTreeSet::new(),
            hidden: HiddenSet::new(),
            manual_hidden: HiddenSet::new(),
            config,
            style: mount.style.clone(),
        };
        backend.prepare(&mut model);
        backend.attach(&*surface);

        let mounted = Self {
            shared: Arc::new(MountShared {
                state: Mutex::new(MountState {
                    backend,
                    model,
                    viewport,
                    surface: Some(surface),
                    echo: EchoSuppressor::new(),
                    listeners: Listeners::default(),
                    destroyed: false,
                    sequence: 0,
                    layout_generation: 0,
                    frames_drawn: 0,
                    layout_runs: 0,
                    present_failures: 0,
                }),
                frames: SinglePending::new(executor),
                selection,
                subscription: Mutex::new(None),
                layout_task: Mutex::new(None),
                runtime: tokio::runtime::Handle::try_current().ok(),
            }),
        };

        if let Some(manager) = &mounted.shared.selection {
            let weak: Weak<MountShared<B>> = Arc::downgrade(&mounted.shared);
            let subscription = manager.subscribe(move |change| {
                if let Some(shared) = weak.upgrade() {
                    let apply = shared.state.lock().echo.filter(change);
                    Mounted { shared }.apply_remote(apply);
                }
            });
            // the Init replay has already synced the existing selection
            *mounted.shared.subscription.lock() = Some(subscription);
        }

        if let Err(err) = mounted.run_layout(&mount.layout, None) {
            tracing::warn!(backend = %B::KIND, error = %err, "Mount layout failed");
        }
        mounted.draw();

        let stats = mounted.stats();
        tracing::info!(
            backend = %B::KIND,
            container = %mount.container.id,
            nodes = stats.nodes,
            edges = stats.edges,
            dropped = report.dropped_nodes + report.dropped_edges,
            "Adapter mounted"
        );
        mounted
    }

    fn live(&self) -> Result<MutexGuard<'_, MountState<B>>, AdapterError> {
        let state = self.shared.state.lock();
        if state.destroyed {
            return Err(AdapterError::Destroyed);
        }
        Ok(state)
    }

    fn request_frame(&self) {
        let weak = Arc::downgrade(&self.shared);
        self.shared.frames.request(move || {
            if let Some(shared) = weak.upgrade() {
                Mounted { shared }.draw();
            }
        });
    }

    fn draw(&self) {
        let mut state = self.shared.state.lock();
        if state.destroyed {
            return;
        }
        state.sequence += 1;
        let frame = build_frame(&state);
        let presented = state.surface.as_mut().map(|surface| surface.present(&frame));
        match presented {
            Some(Ok(())) => state.frames_drawn += 1,
            Some(Err(err)) => {
                state.present_failures += 1;
                tracing::warn!(backend = %B::KIND, sequence = frame.sequence, error = %err, "Frame dropped");
            }
            None => {}
        }
    }

    fn apply_positions(&self, positions: &Positions, generation: u64) -> bool {
        {
            let Ok(mut state) = self.live() else {
                return false;
            };
            if state.layout_generation != generation {
                return false;
            }
            let MountState { backend, model, layout_runs, .. } = &mut *state;
            for (id, position) in positions {
                model.graph.set_position(id, *position);
            }
            backend.prepare(model);
            *layout_runs += 1;
        }
        self.request_frame();
        true
    }

    fn spawn_worker(
        &self,
        kind: LayoutKind,
        input: LayoutInput,
        size: ViewportSize,
        generation: u64,
        on_stop: Option<LayoutCallback>,
    ) -> LayoutStatus {
        let Some(runtime) = &self.shared.runtime else {
            let positions = layout::compute(kind, &input, size);
            if self.apply_positions(&positions, generation) {
                if let Some(callback) = on_stop {
                    callback();
                }
            }
            return LayoutStatus::Completed;
        };

        let weak = Arc::downgrade(&self.shared);
        let task = runtime.spawn(async move {
            let computed =
                tokio::task::spawn_blocking(move || layout::compute(kind, &input, size)).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match computed {
                Ok(positions) => {
                    if (Mounted { shared }).apply_positions(&positions, generation) {
                        if let Some(callback) = on_stop {
                            callback();
                        }
                    }
                }
                Err(err) => tracing::warn!(backend = %B::KIND, error = %err, "Layout worker failed"),
            }
        });
        if let Some(previous) = self.shared.layout_task.lock().replace(task) {
            previous.abort();
        }
        LayoutStatus::Running
    }

    fn set_selected(
        &self,
        key: &CanonicalKey,
        select: bool,
        origin: Origin,
    ) -> Result<bool, AdapterError> {
        let (snapshot, batch) = {
            let mut state = self.live()?;
            if !state.model.graph.contains(key) {
                return Ok(false);
            }
            let changed = if select {
                state.model.selected.insert(key.clone())
            } else {
                state.model.selected.remove(key)
            };
            if !changed {
                return Ok(false);
            }
            let kind = if select { EventKind::Select } else { EventKind::Unselect };
            let batch: Vec<_> = state
                .listeners
                .for_kind(kind)
                .into_iter()
                .map(|h| (h, ViewEvent::new(kind, key.id())))
                .collect();
            (state.model.graph.snapshot(key), batch)
        };
        dispatch(batch);
        self.request_frame();

        if origin == Origin::Local {
            if let (Some(manager), Some(snapshot)) = (&self.shared.selection, snapshot) {
                self.propagate(manager, &snapshot, select);
            }
        }
        Ok(true)
    }

    fn propagate(&self, manager: &SelectionManager, snapshot: &ElementSnapshot, select: bool) {
        let Some(key) = canonical_key(snapshot) else {
            return;
        };
        self.shared.state.lock().echo.record(key.clone());
        let notified = if select { manager.select(snapshot) } else { manager.unselect(snapshot) };
        if !notified {
            self.shared.state.lock().echo.consume(&key);
        }
    }

    fn apply_remote(&self, apply: RemoteApply) {
        // Keys this view does not hold are skipped by set_selected; remote updates for
        // a destroyed adapter are dropped.
        let result = match apply {
            RemoteApply::Echo => Ok(()),
            RemoteApply::Select(key) => self.set_selected(&key, true, Origin::Remote).map(drop),
            RemoteApply::Unselect(key) => self.set_selected(&key, false, Origin::Remote).map(drop),
            RemoteApply::Replace(keys) => {
                let wanted: BTreeSet<CanonicalKey> = keys.into_iter().collect();
                let current: Vec<CanonicalKey> =
                    self.shared.state.lock().model.selected.iter().cloned().collect();
                current
                    .iter()
                    .filter(|key| !wanted.contains(*key))
                    .chain(wanted.iter())
                    .try_for_each(|key| {
                        self.set_selected(key, wanted.contains(key), Origin::Remote).map(drop)
                    })
            }
        };
        if let Err(err) = result {
            tracing::debug!(backend = %B::KIND, error = %err, "Remote selection ignored");
        }
    }
}

fn build_frame<B: Backend>(state: &MountState<B>) -> Frame {
    let MountState { backend, model, viewport, surface, sequence, .. } = state;
    Frame {
        backend: B::KIND,
        sequence: *sequence,
        nodes: model
            .graph
            .nodes()
            .filter(|n| !model.node_hidden(&n.id))
            .map(|n| backend.sprite(model, n))
            .collect(),
        edges: model
            .graph
            .edges()
            .filter(|e| model.edge_visible(e))
            .map(|e| backend.stroke(model, e))
            .collect(),
        camera: backend.camera(viewport, surface.as_deref()),
        layout: backend.delegated_layout(),
    }
}

fn bool_value(key: &str, value: &Value) -> Result<bool, AdapterError> {
    value.as_bool().ok_or_else(|| AdapterError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected a boolean, got {value}"),
    })
}

impl<B: Backend> GraphAdapter for Mounted<B> {
    fn kind(&self) -> Option<BackendKind> {
        Some(B::KIND)
    }

    fn node_ids(&self) -> Result<Vec<String>, AdapterError> {
        Ok(self.live()?.model.graph.node_ids().into_iter().collect())
    }

    fn edge_ids(&self) -> Result<Vec<String>, AdapterError> {
        Ok(self.live()?.model.graph.edge_ids().into_iter().collect())
    }

    fn lookup(&self, id: &str) -> Result<Option<CanonicalKey>, AdapterError> {
        Ok(self.live()?.model.graph.lookup(id))
    }

    fn element_data(&self, element: &CanonicalKey) -> Result<Option<Attributes>, AdapterError> {
        Ok(self.live()?.model.graph.attrs(element).cloned())
    }

    fn set_element_data(
        &self,
        element: &CanonicalKey,
        key: &str,
        value: Value,
    ) -> Result<bool, AdapterError> {
        if !self.live()?.model.graph.contains(element) {
            return Ok(false);
        }
        match key {
            "selected" => {
                let select = bool_value(key, &value)?;
                self.set_selected(element, select, Origin::Local)?;
            }
            "hidden" => {
                let hide = bool_value(key, &value)?;
                let mut state = self.live()?;
                if hide {
                    state.model.manual_hidden.insert(element);
                } else {
                    state.model.manual_hidden.remove(element);
                }
                drop(state);
                self.request_frame();
            }
            "id" | "source" | "target" => {
                return Err(AdapterError::InvalidValue {
                    key: key.to_string(),
                    reason: "element identity is immutable".to_string(),
                });
            }
            _ => {
                let mut state = self.live()?;
                let MountState { backend, model, .. } = &mut *state;
                model.graph.set_attr(element, key, value);
                backend.prepare(model);
                drop(state);
                self.request_frame();
            }
        }
        Ok(true)
    }

    fn has_class(&self, element: &CanonicalKey, class: ElementClass) -> Result<bool, AdapterError> {
        let state = self.live()?;
        Ok(match class {
            ElementClass::Hidden => state.model.is_hidden(element),
            ElementClass::Selected => state.model.is_selected(element),
        })
    }

    fn select(&self, element: &CanonicalKey, origin: Origin) -> Result<bool, AdapterError> {
        self.set_selected(element, true, origin)
    }

    fn unselect(&self, element: &CanonicalKey, origin: Origin) -> Result<bool, AdapterError> {
        self.set_selected(element, false, origin)
    }

    fn unselect_all(&self) -> Result<usize, AdapterError> {
        let selected: Vec<CanonicalKey> = self.live()?.model.selected.iter().cloned().collect();
        let mut count = 0;
        for key in selected {
            if self.set_selected(&key, false, Origin::Local)? {
                count += 1;
            }
        }
        Ok(count)
    }

    fn add(&self, elements: &[ElementSnapshot]) -> Result<NormalizeReport, AdapterError> {
        let report = {
            let mut state = self.live()?;
            let MountState { backend, model, .. } = &mut *state;
            let report = model.graph.merge(elements);
            backend.prepare(model);
            report
        };
        self.request_frame();
        Ok(report)
    }

    fn remove(&self, elements: &[ElementSnapshot]) -> Result<Vec<CanonicalKey>, AdapterError> {
        let removed = {
            let mut state = self.live()?;
            let model = &mut state.model;
            let removed = model.graph.remove(elements);
            let graph = &model.graph;
            model.selected.retain(|key| graph.contains(key));
            model.manual_hidden.retain_present(graph);
            removed
        };
        self.request_frame();
        Ok(removed)
    }

    fn filter(&self, selector: &Selector) -> Result<Vec<CanonicalKey>, AdapterError> {
        let state = self.live()?;
        let model = &state.model;
        let nodes = model.graph.nodes().map(|n| (n.key(), &n.attrs));
        let edges = model.graph.edges().map(|e| (e.key(), &e.attrs));
        Ok(nodes
            .chain(edges)
            .filter(|(key, attrs)| {
                selector.matches(key.kind(), attrs, model.is_selected(key), model.is_hidden(key))
            })
            .map(|(key, _)| key)
            .collect())
    }

    fn run_layout(
        &self,
        descriptor: &LayoutDescriptor,
        on_stop: Option<LayoutCallback>,
    ) -> Result<LayoutStatus, AdapterError> {
        let (plan, size, generation) = {
            let mut state = self.live()?;
            let kind = LayoutKind::from_descriptor(descriptor, state.model.config.layout_iterations)?;
            state.layout_generation += 1;
            let MountState { backend, model, viewport, layout_generation, .. } = &mut *state;
            (backend.layout_plan(kind, descriptor, model, viewport), viewport.size(), *layout_generation)
        };
        tracing::debug!(backend = %B::KIND, layout = %descriptor.name, "Layout requested");

        match plan {
            LayoutPlan::Immediate(positions) => {
                self.apply_positions(&positions, generation);
                if let Some(callback) = on_stop {
                    callback();
                }
                Ok(LayoutStatus::Completed)
            }
            LayoutPlan::Delegated(name) => {
                tracing::debug!(backend = %B::KIND, layout = %name, "Layout delegated to renderer");
                self.request_frame();
                if let Some(callback) = on_stop {
                    callback();
                }
                Ok(LayoutStatus::Delegated)
            }
            LayoutPlan::Worker(kind, input) => {
                Ok(self.spawn_worker(kind, input, size, generation, on_stop))
            }
        }
    }

    fn fit(&self) -> Result<(), AdapterError> {
        {
            let mut state = self.live()?;
            let padding = state.model.config.fit_padding;
            let MountState { backend, model, viewport, surface, .. } = &mut *state;
            viewport.fit(model, padding);
            backend.on_fit(viewport, surface)?;
        }
        self.request_frame();
        Ok(())
    }

    fn center(&self) -> Result<(), AdapterError> {
        {
            let mut state = self.live()?;
            let MountState { model, viewport, .. } = &mut *state;
            viewport.center_on(model);
        }
        self.request_frame();
        Ok(())
    }

    fn zoom(&self) -> Result<f64, AdapterError> {
        let state = self.live()?;
        Ok(state.backend.zoom(&state.viewport, state.surface.as_deref()))
    }

    fn set_zoom(&self, level: f64) -> Result<f64, AdapterError> {
        let zoom = {
            let mut state = self.live()?;
            let MountState { backend, viewport, surface, .. } = &mut *state;
            backend.set_zoom(level, viewport, surface)?;
            backend.zoom(viewport, surface.as_deref())
        };
        self.request_frame();
        Ok(zoom)
    }

    fn resize(&self, width: f64, height: f64) -> Result<(), AdapterError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(width) || !valid(height) {
            return Err(AdapterError::InvalidValue {
                key: "size".to_string(),
                reason: format!("{width}x{height}"),
            });
        }
        {
            let mut state = self.live()?;
            state.viewport.width = width;
            state.viewport.height = height;
        }
        self.request_frame();
        Ok(())
    }

    fn on(&self, kind: EventKind, handler: EventHandler) -> Result<ListenerId, AdapterError> {
        Ok(self.live()?.listeners.add(kind, handler))
    }

    fn off(&self, kind: EventKind, id: ListenerId) -> Result<bool, AdapterError> {
        Ok(self.live()?.listeners.remove(kind, id))
    }

    fn apply_hidden(&self, hidden: &HiddenSet) -> Result<(), AdapterError> {
        self.live()?.model.hidden = hidden.clone();
        self.request_frame();
        Ok(())
    }

    fn manual_hidden(&self) -> Result<HiddenSet, AdapterError> {
        Ok(self.live()?.model.manual_hidden.clone())
    }

    fn graph_snapshot(&self) -> Result<AttributedGraph, AdapterError> {
        Ok(self.live()?.model.graph.clone())
    }

    fn camera_controls(&self) -> Result<Option<CameraControls>, AdapterError> {
        Ok(self.live()?.surface.as_ref().and_then(|s| s.camera_controls()))
    }

    fn stats(&self) -> AdapterStats {
        let state = self.shared.state.lock();
        AdapterStats {
            backend: Some(B::KIND),
            nodes: state.model.graph.node_count(),
            edges: state.model.graph.edge_count(),
            selected: state.model.selected.len(),
            hidden: state.model.hidden.len() + state.model.manual_hidden.len(),
            frames_drawn: state.frames_drawn,
            layout_runs: state.layout_runs,
            present_failures: state.present_failures,
            destroyed: state.destroyed,
        }
    }

    fn is_live(&self) -> bool {
        !self.shared.state.lock().destroyed
    }

    fn destroy(&self) {
        let surface = {
            let mut state = self.shared.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.listeners.clear();
            state.echo.clear();
            state.surface.take()
        };
        self.shared.frames.cancel();
        if let Some(task) = self.shared.layout_task.lock().take() {
            task.abort();
        }
        if let Some(subscription) = self.shared.subscription.lock().take() {
            subscription.unsubscribe();
        }
        if let Some(mut surface) = surface {
            surface.detach();
        }
        tracing::info!(backend = %B::KIND, "Adapter destroyed");
    }
}

/// Explicit `size` attribute, if finite.
pub(crate) fn explicit_size(node: &NodeRecord) -> Option<f64> {
    attr_number(&node.attrs, "size")
}
