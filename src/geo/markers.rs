//! Marker placement state for one render pass.
//!
//! Slots are reset every pass: create fresh [`SeamSlots`] and [`LabelSlots`] per frame.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::canonical::stable_unit;
use crate::types::{LatLng, Marker, MarkerKind, Segment};

/// Default latitude step between chevrons sharing a seam bucket.
pub const SEAM_OFFSET_STEP: f64 = 0.12;

/// Default fraction of the last segment an arrowhead is stepped back.
pub const ARROW_BACK_FRACTION: f64 = 0.02;

const LABEL_PERP_FACTOR: f64 = 0.015;
const LABEL_SLOT_STEP: f64 = 0.025;
const LABEL_JITTER: f64 = 0.06;

fn bucket(v: f64) -> i64 {
    (v * 10.0).round() as i64
}

/// Per-seam occupancy of 0.1° latitude buckets.
#[derive(Debug, Clone)]
pub struct SeamSlots {
    step: f64,
    east: BTreeMap<i64, usize>,
    west: BTreeMap<i64, usize>,
}

impl Default for SeamSlots {
    fn default() -> Self {
        Self::new(SEAM_OFFSET_STEP)
    }
}

impl SeamSlots {
    /// Create empty slots with the given step.
    pub fn new(step: f64) -> Self {
        Self { step, east: BTreeMap::new(), west: BTreeMap::new() }
    }

    /// Claim the next slot for `lat` on `boundary` and return its latitude offset.
    ///
    /// Occupants alternate sides and move one step further out every two:
    /// `+1, -1, +2, -2, ...` times the step. Non-seam boundaries get no offset.
    pub fn offset(&mut self, boundary: f64, lat: f64) -> f64 {
        let map = if boundary == 180.0 {
            &mut self.east
        } else if boundary == -180.0 {
            &mut self.west
        } else {
            return 0.0;
        };
        let n = map.entry(bucket(lat)).or_insert(0);
        let mult = (*n / 2 + 1) as f64;
        let sign = if *n % 2 == 0 { 1.0 } else { -1.0 };
        *n += 1;
        mult * self.step * sign
    }

    /// Shift a chevron off its neighbours. Other markers are returned unchanged.
    pub fn place(&mut self, mut marker: Marker) -> Marker {
        if marker.kind == MarkerKind::Chevron && marker.position.is_finite() {
            marker.position.lat += self.offset(marker.position.lng, marker.position.lat);
        }
        marker
    }
}

/// Arrowhead for a directed edge at the end of its last segment.
///
/// The bearing compensates longitude distortion with `cos(mean latitude)`, and the
/// glyph is stepped back `back_fraction` of the segment so it touches the endpoint.
/// An endpoint lying on the seam takes a seam slot like a chevron would.
pub fn arrowhead(segments: &[Segment], back_fraction: f64, slots: &mut SeamSlots) -> Option<Marker> {
    let last = segments.last()?;
    let (prev, end) = (last.from, last.to);
    if !prev.is_finite() || !end.is_finite() {
        return None;
    }
    let dy = end.lat - prev.lat;
    let mut dx = end.lng - prev.lng;
    if dx > 180.0 {
        dx -= 360.0;
    }
    if dx < -180.0 {
        dx += 360.0;
    }
    let mean_lat = ((end.lat + prev.lat) / 2.0).to_radians();
    let bearing = dy.atan2(dx * mean_lat.cos()).to_degrees();

    let mut at = LatLng::new(end.lat - dy * back_fraction, end.lng - dx * back_fraction);
    if end.lng == 180.0 || end.lng == -180.0 {
        at.lat += slots.offset(end.lng, at.lat);
    }
    Some(Marker::arrowhead(at, bearing))
}

/// Where a relationship label goes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelPlacement {
    /// Anchor position.
    pub position: LatLng,
    /// Text rotation in degrees, kept upright (never in `(90, 270)`).
    pub rotation_deg: f64,
}

/// Midpoint label buckets for one render pass.
#[derive(Debug, Clone, Default)]
pub struct LabelSlots {
    used: BTreeMap<(i64, i64), usize>,
}

impl LabelSlots {
    /// Create empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a label for the edge `from → to`.
    ///
    /// The label sits at the midpoint, nudged perpendicular to the line, offset by its
    /// slot within the midpoint bucket, plus a small jitter that is stable per bucket.
    pub fn place(&mut self, from: LatLng, to: LatLng) -> Option<LabelPlacement> {
        if !from.is_finite() || !to.is_finite() {
            return None;
        }
        let mid_lat = (from.lat + to.lat) / 2.0;
        let mut mid_lng = (from.lng + to.lng) / 2.0;
        if mid_lng > 180.0 {
            mid_lng = ((mid_lng + 180.0) % 360.0) - 180.0;
        }
        if mid_lng < -180.0 {
            mid_lng = ((mid_lng - 180.0) % 360.0) + 180.0;
        }

        let deg = (to.lat - from.lat).atan2(to.lng - from.lng).to_degrees();
        let norm = deg.rem_euclid(360.0);
        let upright = if norm > 90.0 && norm < 270.0 { (norm + 180.0) % 360.0 } else { norm };

        let len_lat = to.lat - from.lat;
        let mut len_lng = to.lng - from.lng;
        if len_lng > 180.0 {
            len_lng -= 360.0;
        }
        if len_lng < -180.0 {
            len_lng += 360.0;
        }
        let len = (len_lat * len_lat + len_lng * len_lng).sqrt();
        let len = if len > 0.0 { len } else { 1.0 };
        let mean_lat = ((from.lat + to.lat) / 2.0).to_radians();
        let ox = -(len_lng / len) * LABEL_PERP_FACTOR / mean_lat.cos().max(0.15);
        let oy = (len_lat / len) * LABEL_PERP_FACTOR;

        let key = (bucket(mid_lat), bucket(mid_lng));
        let slot = self.used.entry(key).or_insert(0);
        let index = *slot;
        *slot += 1;

        let seed = format!("{}/{}", key.0, key.1);
        let jitter_lat = (stable_unit(&seed, 1) - 0.5) * LABEL_JITTER;
        let jitter_lng = (stable_unit(&seed, 2) - 0.5) * LABEL_JITTER;
        let slot_offset = (index as f64 - 0.5) * LABEL_SLOT_STEP;

        Some(LabelPlacement {
            position: LatLng::new(
                mid_lat + oy + slot_offset + jitter_lat,
                mid_lng + ox + jitter_lng,
            ),
            rotation_deg: upright,
        })
    }
}
