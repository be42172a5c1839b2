//! Canonical identity and deterministic hashing.
//!
//! Every view refers to elements by a [`CanonicalKey`], which is a pure function of an
//! element's data and is independent of any backend-internal index.
//!
//! ## Determinism Guarantees
//!
//! - Same element data → same canonical key
//! - Same seed string → same fallback position and default color
//! - Hashes use xxh64 over canonical JSON bytes (serde_json, BTreeMap-ordered maps)

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::types::{ElementKind, ElementSnapshot, Position};

/// Half-width of the square used for fallback coordinates.
pub const FALLBACK_EXTENT: f64 = 500.0;

/// Stable identity of an element across backends: `node:<id>` or `edge:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Key for a node id.
    pub fn node(id: &str) -> Self {
        Self(format!("node:{id}"))
    }

    /// Key for an edge id (explicit or derived `source|target`).
    pub fn edge(id: &str) -> Self {
        Self(format!("edge:{id}"))
    }

    /// Key for an id of the given kind.
    pub fn of(kind: ElementKind, id: &str) -> Self {
        match kind {
            ElementKind::Node => Self::node(id),
            ElementKind::Edge => Self::edge(id),
        }
    }

    /// Element kind encoded in the key.
    pub fn kind(&self) -> ElementKind {
        if self.0.starts_with("edge:") {
            ElementKind::Edge
        } else {
            ElementKind::Node
        }
    }

    /// The id part after the `node:`/`edge:` prefix.
    pub fn id(&self) -> &str {
        self.0.split_once(':').map(|(_, id)| id).unwrap_or(&self.0)
    }

    /// Full key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derived id for an edge without an explicit one.
pub fn derived_edge_id(source: &str, target: &str) -> String {
    format!("{source}|{target}")
}

/// Canonical key of an element snapshot.
///
/// Nodes use `data.id`, falling back to the document-store `_id`. Returns `None` for
/// malformed input: a node with neither, or an edge with neither an id nor a complete
/// source/target pair.
pub fn canonical_key(element: &ElementSnapshot) -> Option<CanonicalKey> {
    match element.kind() {
        ElementKind::Node => element.node_id().map(|id| CanonicalKey::node(&id)),
        ElementKind::Edge => {
            if let Some(id) = element.id() {
                return Some(CanonicalKey::edge(&id));
            }
            let source = element.source()?;
            let target = element.target()?;
            Some(CanonicalKey::edge(&derived_edge_id(&source, &target)))
        }
    }
}

/// Serialize a value to canonical JSON bytes for hashing.
///
/// Returns an empty buffer if the value cannot be represented as JSON
/// (e.g. a map with non-string keys).
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    let bytes = to_canonical_bytes(value);
    xxh64(&bytes, 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Map `(seed, salt)` to a stable value in `[0, 1)`.
pub fn stable_unit(seed: &str, salt: u64) -> f64 {
    let h = xxh64(seed.as_bytes(), salt);
    (h >> 11) as f64 / (1u64 << 53) as f64
}

/// Deterministic pseudo-random position in `[-500, 500]²` for an id.
///
/// Used wherever a renderer must never see a non-finite coordinate.
pub fn fallback_position(id: &str) -> Position {
    Position::new(
        (stable_unit(id, 1) * 2.0 - 1.0) * FALLBACK_EXTENT,
        (stable_unit(id, 2) * 2.0 - 1.0) * FALLBACK_EXTENT,
    )
}

/// Deterministic `#rrggbb` color for a string (hue from a 31-multiplier hash, s 62%, l 52%).
pub fn string_to_color(s: &str) -> String {
    let h = s
        .chars()
        .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32));
    let hue = (h % 360) as f64;
    let (r, g, b) = hsl_to_rgb(hue, 0.62, 0.52);
    format!("#{r:02x}{g:02x}{b:02x}")
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let hp = h / 60.0;
    let x = c * (1.0 - (hp % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match hp as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r1), to_byte(g1), to_byte(b1))
}
