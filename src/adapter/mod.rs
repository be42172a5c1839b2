//! Backend adapters.
//!
//! Three structurally different renderers are driven through one contract:
//!
//! ```text
//! Mounter::mount(kind, config)
//!     │  RuntimeLoader::load ──✗──► NoopAdapter
//!     ▼
//! Mounted<RetainedBackend | GpuBackend | SceneBackend>   (GraphAdapter)
//!     │
//!     ▼
//! Handle  ── logs + counts failures, returns safe defaults ──► host
//! ```
//!
//! [`GraphAdapter`] methods return `Result`; [`Handle`] is the single place where
//! failures are logged and swallowed, so nothing the host calls can panic or error.

mod mounted;
pub mod gpu;
pub mod noop;
pub mod retained;
pub mod scene;
pub mod selector;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::CanonicalKey;
use crate::config::{ViewConfig, ViewportSize};
use crate::events::{EventHandler, EventKind, ListenerId, ViewEvent};
use crate::layout::{LayoutCallback, LayoutDescriptor, LayoutError, LayoutStatus};
use crate::normalize::{AttributedGraph, NormalizeReport};
use crate::runtime::{CameraControls, Container, RuntimeError, RuntimeLoader};
use crate::scheduler::{Executor, InlineExecutor};
use crate::selection::{Origin, SelectionManager};
use crate::timeline::{HiddenSet, VisibilityTarget};
use crate::types::{attr_number, Attributes, ElementKind, ElementSnapshot};

use self::mounted::Mounted;
use self::gpu::GpuBackend;
use self::retained::RetainedBackend;
use self::scene::SceneBackend;

pub use self::gpu::parallel_curvature;
pub use self::noop::NoopAdapter;
pub use self::scene::SceneLayout;
pub use self::selector::{Selector, SelectorError};

/// Rendering backend, chosen once per mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Retained-mode 2D renderer.
    Retained,
    /// GPU-accelerated 2D renderer.
    Gpu,
    /// 3D scene renderer.
    Scene,
}

impl BackendKind {
    /// Parse backend kind from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "retained" | "cytoscape" | "2d" => Some(Self::Retained),
            "gpu" | "webgl" | "sigma" => Some(Self::Gpu),
            "scene" | "3d" | "reagraph" => Some(Self::Scene),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retained => write!(f, "retained"),
            Self::Gpu => write!(f, "gpu"),
            Self::Scene => write!(f, "scene"),
        }
    }
}

/// Classes an element can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementClass {
    /// Hidden by the timeline or by `set("hidden", true)`.
    Hidden,
    /// Selected in this view.
    Selected,
}

/// Error type for adapter operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdapterError {
    /// The adapter was destroyed.
    #[error("Adapter destroyed")]
    Destroyed,

    /// Bad selector.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Bad layout descriptor.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Renderer failure.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A value could not be applied.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue {
        /// Attribute or parameter name.
        key: String,
        /// What was wrong.
        reason: String,
    },

    /// Unknown event name.
    #[error("Unknown event type: {0}")]
    UnknownEvent(String),
}

/// Counters for one mounted view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdapterStats {
    /// Backend, `None` for the no-op adapter.
    pub backend: Option<BackendKind>,
    /// Node count.
    pub nodes: usize,
    /// Edge count.
    pub edges: usize,
    /// Selected elements.
    pub selected: usize,
    /// Hidden elements.
    pub hidden: usize,
    /// Frames presented.
    pub frames_drawn: u64,
    /// Layout results applied.
    pub layout_runs: u64,
    /// Frames the surface rejected.
    pub present_failures: u64,
    /// Whether the view was destroyed.
    pub destroyed: bool,
}

/// The uniform backend contract.
pub trait GraphAdapter: Send + Sync {
    /// Backend, `None` for the no-op adapter.
    fn kind(&self) -> Option<BackendKind>;
    /// Node ids in order.
    fn node_ids(&self) -> Result<Vec<String>, AdapterError>;
    /// Edge ids in order.
    fn edge_ids(&self) -> Result<Vec<String>, AdapterError>;
    /// Key of the element with a bare id, nodes first. `None` if unknown.
    fn lookup(&self, id: &str) -> Result<Option<CanonicalKey>, AdapterError>;
    /// Element attributes.
    fn element_data(&self, element: &CanonicalKey) -> Result<Option<Attributes>, AdapterError>;
    /// Set one attribute. Returns `false` for unknown elements.
    fn set_element_data(
        &self,
        element: &CanonicalKey,
        key: &str,
        value: Value,
    ) -> Result<bool, AdapterError>;
    /// Whether an element carries a class.
    fn has_class(&self, element: &CanonicalKey, class: ElementClass) -> Result<bool, AdapterError>;
    /// Select an element. Returns `false` when nothing changed.
    fn select(&self, element: &CanonicalKey, origin: Origin) -> Result<bool, AdapterError>;
    /// Unselect an element. Returns `false` when nothing changed.
    fn unselect(&self, element: &CanonicalKey, origin: Origin) -> Result<bool, AdapterError>;
    /// Unselect everything. Returns how many were unselected.
    fn unselect_all(&self) -> Result<usize, AdapterError>;
    /// Merge elements.
    fn add(&self, elements: &[ElementSnapshot]) -> Result<NormalizeReport, AdapterError>;
    /// Remove elements and, for nodes, their incident edges.
    fn remove(&self, elements: &[ElementSnapshot]) -> Result<Vec<CanonicalKey>, AdapterError>;
    /// Keys matching a selector, nodes first.
    fn filter(&self, selector: &Selector) -> Result<Vec<CanonicalKey>, AdapterError>;
    /// Run a layout; `on_stop` fires once positions are applied.
    fn run_layout(
        &self,
        descriptor: &LayoutDescriptor,
        on_stop: Option<LayoutCallback>,
    ) -> Result<LayoutStatus, AdapterError>;
    /// Fit the graph into the viewport.
    fn fit(&self) -> Result<(), AdapterError>;
    /// Center the graph.
    fn center(&self) -> Result<(), AdapterError>;
    /// Current zoom.
    fn zoom(&self) -> Result<f64, AdapterError>;
    /// Set zoom; returns the zoom now in effect.
    fn set_zoom(&self, level: f64) -> Result<f64, AdapterError>;
    /// Container resized.
    fn resize(&self, width: f64, height: f64) -> Result<(), AdapterError>;
    /// Add an event listener.
    fn on(&self, kind: EventKind, handler: EventHandler) -> Result<ListenerId, AdapterError>;
    /// Remove an event listener.
    fn off(&self, kind: EventKind, id: ListenerId) -> Result<bool, AdapterError>;
    /// Replace the timeline hidden set.
    fn apply_hidden(&self, hidden: &HiddenSet) -> Result<(), AdapterError>;
    /// Elements hidden with `set("hidden", true)`.
    fn manual_hidden(&self) -> Result<HiddenSet, AdapterError>;
    /// Copy of the current graph.
    fn graph_snapshot(&self) -> Result<AttributedGraph, AdapterError>;
    /// Scene camera controls, if the runtime has them.
    fn camera_controls(&self) -> Result<Option<CameraControls>, AdapterError>;
    /// Counters.
    fn stats(&self) -> AdapterStats;
    /// Whether the adapter accepts calls.
    fn is_live(&self) -> bool;
    /// Tear down. Idempotent.
    fn destroy(&self);
}

/// What to mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountConfig {
    /// Host container.
    #[serde(skip, default = "default_container")]
    pub container: Container,
    /// Initial elements.
    #[serde(default)]
    pub elements: Vec<ElementSnapshot>,
    /// Initial layout.
    #[serde(default = "LayoutDescriptor::preset")]
    pub layout: LayoutDescriptor,
    /// Style descriptor; `width`/`height` override the container size.
    #[serde(default)]
    pub style: Attributes,
}

fn default_container() -> Container {
    let size = ViewportSize::default();
    Container::new("default", size.width, size.height)
}

impl MountConfig {
    /// Mount `elements` into `container` with a preset layout.
    pub fn new(container: Container, elements: Vec<ElementSnapshot>) -> Self {
        Self { container, elements, layout: LayoutDescriptor::preset(), style: Attributes::new() }
    }

    /// Builder: initial layout.
    pub fn with_layout(mut self, layout: LayoutDescriptor) -> Self {
        self.layout = layout;
        self
    }

    /// Builder: style descriptor.
    pub fn with_style(mut self, style: Attributes) -> Self {
        self.style = style;
        self
    }

    /// Effective viewport size: style, then container, then `fallback`.
    pub fn viewport_size(&self, fallback: ViewportSize) -> ViewportSize {
        let pick = |style_key: &str, container: f64, fallback: f64| {
            attr_number(&self.style, style_key)
                .into_iter()
                .chain(std::iter::once(container))
                .find(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(fallback)
        };
        ViewportSize {
            width: pick("width", self.container.width, fallback.width),
            height: pick("height", self.container.height, fallback.height),
        }
    }
}

/// Mounts backends against a runtime loader.
#[derive(Clone)]
pub struct Mounter {
    loader: Arc<dyn RuntimeLoader>,
    selection: Option<SelectionManager>,
    executor: Arc<dyn Executor>,
    config: ViewConfig,
}

impl std::fmt::Debug for Mounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mounter")
            .field("selection", &self.selection)
            .field("config", &self.config)
            .finish()
    }
}

impl Mounter {
    /// Mounter with inline frame scheduling, no selection session and default config.
    ///
    /// Inline scheduling draws before each mutating call returns, with no dependency on
    /// an ambient tokio runtime, so the same mounter works from synchronous hosts and
    /// tests. Interactive hosts that mutate in bursts should pass
    /// [`FrameExecutor::current`](crate::scheduler::FrameExecutor::current) to
    /// [`with_executor`](Self::with_executor) so that a burst collapses into one frame.
    pub fn new(loader: Arc<dyn RuntimeLoader>) -> Self {
        Self {
            loader,
            selection: None,
            executor: Arc::new(InlineExecutor),
            config: ViewConfig::default(),
        }
    }

    /// Builder: join every mounted view to this selection session.
    pub fn with_selection(mut self, selection: SelectionManager) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Builder: frame executor.
    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    /// Builder: view configuration.
    pub fn with_config(mut self, config: ViewConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the runtime, build the view, run the initial layout and draw once.
    ///
    /// Never fails: if the runtime cannot be loaded, the returned handle is a no-op.
    pub async fn mount(&self, kind: BackendKind, config: MountConfig) -> Handle {
        let surface = match self.loader.load(kind, &config.container).await {
            Ok(surface) => surface,
            Err(err) => {
                tracing::warn!(
                    backend = %kind,
                    container = %config.container.id,
                    error = %err,
                    "Runtime unavailable, falling back to no-op adapter"
                );
                return Handle::noop();
            }
        };

        let selection = self.selection.clone();
        let executor = Arc::clone(&self.executor);
        let view = self.config.clone();
        let adapter: Arc<dyn GraphAdapter> = match kind {
            BackendKind::Retained => Arc::new(Mounted::mount(
                RetainedBackend, surface, &config, view, selection, executor,
            )),
            BackendKind::Gpu => Arc::new(Mounted::mount(
                GpuBackend::default(),
                surface,
                &config,
                view,
                selection,
                executor,
            )),
            BackendKind::Scene => Arc::new(Mounted::mount(
                SceneBackend::default(),
                surface,
                &config,
                view,
                selection,
                executor,
            )),
        };
        Handle::new(adapter)
    }
}

/// The host-facing view handle.
///
/// Every call is total: failures are logged, counted and answered with a default.
#[derive(Clone)]
pub struct Handle {
    adapter: Arc<dyn GraphAdapter>,
    failures: Arc<AtomicU64>,
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("stats", &self.adapter.stats())
            .field("failures", &self.failure_count())
            .finish()
    }
}

impl Handle {
    /// Wrap an adapter.
    pub fn new(adapter: Arc<dyn GraphAdapter>) -> Self {
        Self { adapter, failures: Arc::new(AtomicU64::new(0)) }
    }

    /// A handle over the no-op adapter.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopAdapter))
    }

    fn guard_or<T>(&self, op: &'static str, result: Result<T, AdapterError>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(AdapterError::Destroyed) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(op, "Call on destroyed adapter ignored");
                fallback
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    op,
                    backend = ?self.adapter.kind(),
                    error = %err,
                    "Adapter operation failed"
                );
                fallback
            }
        }
    }

    fn guard<T: Default>(&self, op: &'static str, result: Result<T, AdapterError>) -> T {
        self.guard_or(op, result, T::default())
    }

    fn refs(&self, keys: impl IntoIterator<Item = CanonicalKey>) -> Vec<ElementRef> {
        keys.into_iter().map(|key| ElementRef { handle: self.clone(), key }).collect()
    }

    /// Backend, `None` for a no-op handle.
    pub fn kind(&self) -> Option<BackendKind> {
        self.adapter.kind()
    }

    /// Live node wrappers.
    pub fn nodes(&self) -> Vec<ElementRef> {
        let ids = self.guard("nodes", self.adapter.node_ids());
        self.refs(ids.iter().map(|id| CanonicalKey::node(id)))
    }

    /// Live edge wrappers.
    pub fn edges(&self) -> Vec<ElementRef> {
        let ids = self.guard("edges", self.adapter.edge_ids());
        self.refs(ids.iter().map(|id| CanonicalKey::edge(id)))
    }

    /// Nodes, then edges.
    pub fn elements(&self) -> Vec<ElementRef> {
        let mut all = self.nodes();
        all.extend(self.edges());
        all
    }

    /// Wrapper for the element with a bare id. A node wins over an edge sharing its id;
    /// use [`element`](Self::element) to address the edge.
    pub fn get(&self, id: &str) -> Option<ElementRef> {
        let key = self.guard("get", self.adapter.lookup(id))?;
        Some(ElementRef { handle: self.clone(), key })
    }

    /// Wrapper for the element with this key, if the view holds it.
    pub fn element(&self, key: &CanonicalKey) -> Option<ElementRef> {
        let data = self.guard("element", self.adapter.element_data(key));
        data.map(|_| ElementRef { handle: self.clone(), key: key.clone() })
    }

    /// Select the element with a bare id, nodes first. Unknown ids return `false`.
    pub fn select(&self, id: &str) -> bool {
        self.get(id).is_some_and(|el| el.select())
    }

    /// Unselect the element with a bare id, nodes first. Unknown ids return `false`.
    pub fn unselect(&self, id: &str) -> bool {
        self.get(id).is_some_and(|el| el.unselect())
    }

    /// Select the element with this key.
    pub fn select_key(&self, key: &CanonicalKey) -> bool {
        self.guard("select", self.adapter.select(key, Origin::Local))
    }

    /// Unselect the element with this key.
    pub fn unselect_key(&self, key: &CanonicalKey) -> bool {
        self.guard("unselect", self.adapter.unselect(key, Origin::Local))
    }

    /// Unselect everything. Returns how many were unselected.
    pub fn unselect_all(&self) -> usize {
        self.guard("unselect_all", self.adapter.unselect_all())
    }

    /// Merge elements.
    pub fn add(&self, elements: &[ElementSnapshot]) -> NormalizeReport {
        self.guard("add", self.adapter.add(elements))
    }

    /// Remove elements. Returns the removed keys.
    pub fn remove(&self, elements: &[ElementSnapshot]) -> Vec<CanonicalKey> {
        self.guard("remove", self.adapter.remove(elements))
    }

    /// Elements matching a selector.
    pub fn filter(&self, selector: &str) -> Vec<ElementRef> {
        let matched = Selector::parse(selector)
            .map_err(AdapterError::from)
            .and_then(|selector| self.adapter.filter(&selector));
        let keys = self.guard("filter", matched);
        self.refs(keys)
    }

    /// Prepare a layout run.
    pub fn layout(&self, descriptor: LayoutDescriptor) -> LayoutRequest<'_> {
        LayoutRequest { handle: self, descriptor, on_stop: None }
    }

    /// Fit the graph into the viewport.
    pub fn fit(&self) {
        self.guard("fit", self.adapter.fit())
    }

    /// Center the graph.
    pub fn center(&self) {
        self.guard("center", self.adapter.center())
    }

    /// Get (`None`) or set (`Some`) the zoom; returns the zoom in effect.
    pub fn zoom(&self, level: Option<f64>) -> f64 {
        match level {
            None => self.guard_or("zoom", self.adapter.zoom(), 1.0),
            Some(level) => self.guard_or("zoom", self.adapter.set_zoom(level), 1.0),
        }
    }

    /// Container resized.
    pub fn resize(&self, width: f64, height: f64) {
        self.guard("resize", self.adapter.resize(width, height))
    }

    /// Listen for `select` or `unselect`.
    pub fn on<F>(&self, event: &str, handler: F) -> Option<ListenerId>
    where
        F: Fn(&ViewEvent) + Send + Sync + 'static,
    {
        let result = EventKind::from_str(event)
            .ok_or_else(|| AdapterError::UnknownEvent(event.to_string()))
            .and_then(|kind| self.adapter.on(kind, Arc::new(handler)).map(Some));
        self.guard("on", result)
    }

    /// Stop listening.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let result = EventKind::from_str(event)
            .ok_or_else(|| AdapterError::UnknownEvent(event.to_string()))
            .and_then(|kind| self.adapter.off(kind, id));
        self.guard("off", result)
    }

    /// Tear down. Idempotent.
    pub fn destroy(&self) {
        self.adapter.destroy();
    }

    /// Whether the view accepts calls.
    pub fn is_live(&self) -> bool {
        self.adapter.is_live()
    }

    /// Scene camera controls.
    pub fn camera_controls(&self) -> Option<CameraControls> {
        self.guard("camera_controls", self.adapter.camera_controls())
    }

    /// Copy of the current graph.
    pub fn graph_snapshot(&self) -> AttributedGraph {
        self.guard("graph_snapshot", self.adapter.graph_snapshot())
    }

    /// Failures swallowed at this boundary.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Adapter counters.
    pub fn stats(&self) -> AdapterStats {
        self.adapter.stats()
    }
}

impl VisibilityTarget for Handle {
    fn target_name(&self) -> String {
        self.kind().map_or_else(|| "noop".to_string(), |k| k.to_string())
    }

    fn visibility_graph(&self) -> Option<AttributedGraph> {
        match self.adapter.graph_snapshot() {
            Ok(graph) if self.kind().is_some() => Some(graph),
            _ => None,
        }
    }

    fn manual_hidden(&self) -> HiddenSet {
        self.guard("manual_hidden", self.adapter.manual_hidden())
    }

    fn apply_hidden(&self, hidden: &HiddenSet) {
        self.guard("apply_hidden", self.adapter.apply_hidden(hidden))
    }

    fn recover(&self) {
        self.fit();
        self.center();
    }
}

/// A layout about to run.
pub struct LayoutRequest<'a> {
    handle: &'a Handle,
    descriptor: LayoutDescriptor,
    on_stop: Option<LayoutCallback>,
}

impl LayoutRequest<'_> {
    /// Call `callback` once positions are applied.
    pub fn on_stop<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_stop = Some(Box::new(callback));
        self
    }

    /// Run it.
    pub fn run(self) -> LayoutStatus {
        let handle = self.handle;
        handle.guard("layout", handle.adapter.run_layout(&self.descriptor, self.on_stop))
    }
}

/// A live element wrapper. Reads and writes go through the owning view.
#[derive(Clone)]
pub struct ElementRef {
    handle: Handle,
    key: CanonicalKey,
}

impl std::fmt::Debug for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementRef").field("key", &self.key).finish()
    }
}

impl ElementRef {
    /// Element id.
    pub fn id(&self) -> &str {
        self.key.id()
    }

    /// Canonical key.
    pub fn key(&self) -> &CanonicalKey {
        &self.key
    }

    /// Node or edge.
    pub fn kind(&self) -> ElementKind {
        self.key.kind()
    }

    /// Whether this is a node.
    pub fn is_node(&self) -> bool {
        self.kind() == ElementKind::Node
    }

    /// Whether this is an edge.
    pub fn is_edge(&self) -> bool {
        self.kind() == ElementKind::Edge
    }

    /// All attributes.
    pub fn data(&self) -> Attributes {
        self.handle
            .guard("data", self.handle.adapter.element_data(&self.key))
            .unwrap_or_default()
    }

    /// One attribute.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data().remove(key)
    }

    /// Set one attribute. `selected` and `hidden` route through selection and visibility.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        let result = self.handle.adapter.set_element_data(&self.key, key, value.into());
        self.handle.guard("set", result)
    }

    /// Select this element.
    pub fn select(&self) -> bool {
        self.handle.select_key(&self.key)
    }

    /// Unselect this element.
    pub fn unselect(&self) -> bool {
        self.handle.unselect_key(&self.key)
    }

    /// Whether this element carries a class.
    pub fn has_class(&self, class: ElementClass) -> bool {
        self.handle.guard("has_class", self.handle.adapter.has_class(&self.key, class))
    }
}
