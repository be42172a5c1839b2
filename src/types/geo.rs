//! Geographic render primitives produced by the edge projector.

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl LatLng {
    /// Create a new coordinate.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components are finite.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// One straight polyline piece of a projected edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// First vertex.
    pub from: LatLng,
    /// Last vertex.
    pub to: LatLng,
}

impl Segment {
    /// Create a segment.
    pub fn new(from: LatLng, to: LatLng) -> Self {
        Self { from, to }
    }

    /// Midpoint in plain lat/lng space.
    pub fn midpoint(&self) -> LatLng {
        LatLng::new(
            (self.from.lat + self.to.lat) / 2.0,
            (self.from.lng + self.to.lng) / 2.0,
        )
    }
}

/// Marker glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Glyph {
    /// Eastward travel across a seam.
    ChevronEast,
    /// Westward travel across a seam.
    ChevronWest,
    /// Direction arrowhead, rotated by the marker's bearing.
    Arrow,
}

impl Glyph {
    /// Character drawn for this glyph.
    pub fn as_char(&self) -> char {
        match self {
            Self::ChevronEast => '»',
            Self::ChevronWest => '«',
            Self::Arrow => '▶',
        }
    }
}

impl std::fmt::Display for Glyph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// What a marker marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    /// Seam crossing chevron.
    Chevron,
    /// Edge direction arrowhead.
    Arrowhead,
}

/// A positioned, rotated glyph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    /// Marker kind.
    pub kind: MarkerKind,
    /// Where the glyph is anchored.
    pub position: LatLng,
    /// Glyph to draw.
    pub glyph: Glyph,
    /// Counter-clockwise-from-east bearing in degrees (0 for chevrons).
    pub rotation_deg: f64,
}

impl Marker {
    /// Seam chevron at `position`.
    pub fn chevron(position: LatLng, glyph: Glyph) -> Self {
        Self { kind: MarkerKind::Chevron, position, glyph, rotation_deg: 0.0 }
    }

    /// Arrowhead at `position` with the given bearing.
    pub fn arrowhead(position: LatLng, rotation_deg: f64) -> Self {
        Self { kind: MarkerKind::Arrowhead, position, glyph: Glyph::Arrow, rotation_deg }
    }
}
