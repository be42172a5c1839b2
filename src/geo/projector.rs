//! Antimeridian-aware edge projection.
//!
//! ## Algorithm
//!
//! 1. Normalize both longitudes into `[-180, 180]`
//! 2. `delta = lng2 - lng1`, `wrapped = ((delta + 540) mod 360) - 180`
//! 3. `|delta| <= 180`: one segment, no markers
//! 4. Otherwise the short way crosses the seam. With `sign = wrapped >= 0 ? +1 : -1`
//!    the edge leaves through `boundary = 180 * sign` and re-enters through `-boundary`.
//!    The seam latitude is interpolated at `t = distance_to_seam / |wrapped|` and the
//!    edge is drawn as two segments with a chevron on each side of the seam.

use serde::{Deserialize, Serialize};

use crate::types::{Glyph, LatLng, Marker, Segment};

/// Segments and seam markers for one edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    /// One segment, or two when the edge crosses the antimeridian.
    pub segments: Vec<Segment>,
    /// Seam chevrons: the exit side first, then the entry side.
    pub markers: Vec<Marker>,
}

impl Projection {
    /// Whether the edge was split at the seam.
    pub fn crosses_seam(&self) -> bool {
        self.segments.len() > 1
    }

    /// Empty projection (nothing to draw).
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Bring a longitude into `[-180, 180]`.
pub fn normalize_lng(lng: f64) -> f64 {
    if !lng.is_finite() {
        return lng;
    }
    let mut x = lng;
    if x.abs() > 540.0 {
        x %= 360.0;
    }
    while x > 180.0 {
        x -= 360.0;
    }
    while x < -180.0 {
        x += 360.0;
    }
    x
}

/// Project an edge between two points.
///
/// Non-finite coordinates produce an empty projection.
pub fn project(p1: LatLng, p2: LatLng) -> Projection {
    if !p1.is_finite() || !p2.is_finite() {
        return Projection::default();
    }
    let a = LatLng::new(p1.lat, normalize_lng(p1.lng));
    let b = LatLng::new(p2.lat, normalize_lng(p2.lng));

    let delta = b.lng - a.lng;
    if delta.abs() <= 180.0 {
        return Projection { segments: vec![Segment::new(a, b)], markers: Vec::new() };
    }

    let wrapped = (delta + 540.0).rem_euclid(360.0) - 180.0;
    let sign = if wrapped >= 0.0 { 1.0 } else { -1.0 };
    let boundary = 180.0 * sign;

    let to_seam = if sign > 0.0 {
        (boundary - a.lng + 360.0).rem_euclid(360.0)
    } else {
        (a.lng - boundary + 360.0).rem_euclid(360.0)
    };
    let total = wrapped.abs();
    let t = if total > 0.0 { (to_seam / total).clamp(0.0, 1.0) } else { 0.0 };
    let seam_lat = a.lat + t * (b.lat - a.lat);

    let exit = LatLng::new(seam_lat, boundary);
    let entry = LatLng::new(seam_lat, -boundary);
    let glyph = if sign > 0.0 { Glyph::ChevronEast } else { Glyph::ChevronWest };

    Projection {
        segments: vec![Segment::new(a, exit), Segment::new(entry, b)],
        markers: vec![Marker::chevron(exit, glyph), Marker::chevron(entry, glyph)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarkerKind;
    use proptest::prelude::*;

    #[test]
    fn test_short_edge_single_segment() {
        let p = project(LatLng::new(10.0, 10.0), LatLng::new(10.0, 20.0));
        assert_eq!(p.segments.len(), 1);
        assert!(p.markers.is_empty());
        assert!(!p.crosses_seam());
    }

    #[test]
    fn test_eastward_crossing() {
        let p = project(LatLng::new(10.0, 170.0), LatLng::new(10.0, -170.0));
        assert_eq!(p.segments.len(), 2);
        assert_eq!(p.markers.len(), 2);
        assert_eq!(p.markers[0].position.lng, 180.0);
        assert_eq!(p.markers[1].position.lng, -180.0);
        assert!(p.markers.iter().all(|m| m.kind == MarkerKind::Chevron));
        assert_eq!(p.markers[0].glyph, Glyph::ChevronEast);
        assert_eq!(p.segments[0].to, LatLng::new(10.0, 180.0));
        assert_eq!(p.segments[1].from, LatLng::new(10.0, -180.0));
    }

    #[test]
    fn test_westward_crossing_interpolates_latitude() {
        // 10° to the seam out of 40° total: t = 0.25
        let p = project(LatLng::new(0.0, -170.0), LatLng::new(40.0, 150.0));
        assert_eq!(p.markers[0].position.lng, -180.0);
        assert_eq!(p.markers[1].position.lng, 180.0);
        assert_eq!(p.markers[0].glyph, Glyph::ChevronWest);
        assert!((p.markers[0].position.lat - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unnormalized_input() {
        // 190° is -170°: the pair (-170, 170) crosses westward
        let p = project(LatLng::new(0.0, 190.0), LatLng::new(0.0, 170.0));
        assert!(p.crosses_seam());
        assert_eq!(normalize_lng(540.0), 180.0);
        assert_eq!(normalize_lng(-190.0), 170.0);
    }

    #[test]
    fn test_non_finite_is_empty() {
        let p = project(LatLng::new(f64::NAN, 0.0), LatLng::new(0.0, 1.0));
        assert!(p.is_empty());
        assert!(p.markers.is_empty());
    }

    proptest! {
        #[test]
        fn prop_segments_stay_in_range(
            lat1 in -85.0f64..85.0, lng1 in -720.0f64..720.0,
            lat2 in -85.0f64..85.0, lng2 in -720.0f64..720.0,
        ) {
            let p = project(LatLng::new(lat1, lng1), LatLng::new(lat2, lng2));
            prop_assert!(p.segments.len() == 1 || p.segments.len() == 2);
            prop_assert_eq!(p.markers.len(), if p.segments.len() == 2 { 2 } else { 0 });
            for s in &p.segments {
                for pt in [s.from, s.to] {
                    prop_assert!(pt.lng >= -180.0 && pt.lng <= 180.0);
                    prop_assert!(pt.lat >= lat1.min(lat2) - 1e-9 && pt.lat <= lat1.max(lat2) + 1e-9);
                }
            }
        }
    }
}
