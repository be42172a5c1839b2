//! Core types for the view kernel.

pub mod element;
pub mod time;
pub mod geo;

pub use element::{
    Attributes, ElementKind, ElementSnapshot, Position,
    attr_number, attr_str, value_to_id,
};
pub use time::{TimeWindow, TIME_FIELDS, parse_timestamp, element_timestamp};
pub use geo::{LatLng, Segment, Marker, MarkerKind, Glyph};
