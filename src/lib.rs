//! # topoview-kernel
//!
//! One attributed graph, several synchronized views.
//!
//! The kernel drives interchangeable rendering backends over the same element set,
//! keeps a single logical selection consistent across every mounted view, and hides
//! elements outside a user-controlled time window without ever blanking a view.
//!
//! ## Core Contract
//!
//! 1. Elements are normalized once per view into an [`AttributedGraph`] keyed by stable ids
//! 2. Every backend is driven through the same [`Handle`], whatever its renderer
//! 3. Selection changes flow through a [`SelectionManager`] and never echo back to their origin
//! 4. A time window that would hide everything is rejected, not applied
//!
//! ## Architecture
//!
//! ```text
//! elements ──► normalize ──► Mounted<Backend> ──► Handle ──► host
//!                                 │    ▲
//!                      select()   ▼    │ Remote
//!                            SelectionManager ◄──► GeoMapView ──► geo::project
//!                                                       ▲
//!                  TimelineFilter ── hidden sets ───────┴──► Handle
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Canonical keys are a pure function of element data
//! - Fallback coordinates and colors are derived from id hashes
//! - Graph iteration order is id order

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod canonical;
pub mod config;
pub mod normalize;
pub mod selection;
pub mod scheduler;
pub mod events;
pub mod layout;
pub mod runtime;
pub mod adapter;
pub mod timeline;
pub mod geo;
pub mod telemetry;

// Re-exports
pub use types::{
    Attributes, ElementKind, ElementSnapshot, Position, TimeWindow, LatLng, Segment, Marker,
    MarkerKind, Glyph, parse_timestamp, element_timestamp,
};
pub use canonical::{
    CanonicalKey, canonical_key, derived_edge_id, canonical_hash, canonical_hash_hex,
    fallback_position, string_to_color,
};
pub use config::{ConfigError, ScaleRange, ViewConfig, ViewportSize};
pub use normalize::{
    AttributedGraph, EdgeRecord, NodeRecord, NormalizeReport, WeightRange, normalize, map_range,
    parallel_label_offset,
};
pub use selection::{
    EchoSuppressor, Origin, RemoteApply, SelectionAction, SelectionChange, SelectionEvent,
    SelectionManager, Subscription,
};
pub use scheduler::{Executor, FrameExecutor, InlineExecutor, ManualExecutor, SinglePending};
pub use events::{EventKind, ListenerId, ViewEvent};
pub use layout::{LayoutDescriptor, LayoutError, LayoutKind, LayoutStatus};
pub use runtime::{
    CameraControls, Container, Frame, HeadlessRuntime, RenderSurface, RuntimeError,
    RuntimeLoader, UnavailableRuntime,
};
pub use adapter::{
    AdapterError, AdapterStats, BackendKind, ElementClass, ElementRef, GraphAdapter, Handle,
    LayoutRequest, MountConfig, Mounter, SceneLayout, Selector, SelectorError,
};
pub use timeline::{
    HiddenSet, Notice, NoticeLevel, TimelineFilter, VisibilityError, VisibilityOutcome,
    VisibilityTarget, plan_visibility,
};
pub use geo::{GeoFrame, GeoMapView, GeoViewport, Projection, project};
pub use telemetry::{init_tracing, LogFormat, TelemetryError};

/// Schema version for frames, events and notices.
/// Increment on breaking changes to any outbound type.
pub const TOPOVIEW_SCHEMA_VERSION: &str = "1.0.0";
