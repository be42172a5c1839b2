//! Geographic edge rendering.
//!
//! [`projector`] is pure geometry: lat/lng endpoints in, segments and seam chevrons out.
//! [`markers`] holds the per-render-pass state that keeps markers and labels from
//! stacking. [`view`] is the geographic view that draws elements with both.

pub mod projector;
pub mod markers;
pub mod view;

pub use projector::{normalize_lng, project, Projection};
pub use markers::{arrowhead, LabelPlacement, LabelSlots, SeamSlots};
pub use view::{GeoEdgeShape, GeoFrame, GeoLabel, GeoMapView, GeoNodePoint, GeoViewport};
