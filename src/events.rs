//! `select`/`unselect` events emitted by views to the host.

use std::sync::Arc;

use serde::Serialize;

/// Event types a view emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// An element became selected.
    Select,
    /// An element became unselected.
    Unselect,
}

impl EventKind {
    /// Parse event kind from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "select" => Some(Self::Select),
            "unselect" => Some(Self::Unselect),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Select => write!(f, "select"),
            Self::Unselect => write!(f, "unselect"),
        }
    }
}

/// Event target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventTarget {
    /// Element id within the emitting view.
    pub id: String,
}

/// Payload `{type, target: {id}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewEvent {
    /// Event type.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Element the event is about.
    pub target: EventTarget,
}

impl ViewEvent {
    /// Create an event for an element id.
    pub fn new(kind: EventKind, id: impl Into<String>) -> Self {
        Self { kind, target: EventTarget { id: id.into() } }
    }
}

/// Event callback.
pub type EventHandler = Arc<dyn Fn(&ViewEvent) + Send + Sync>;

/// Registration token returned by `on`, passed back to `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ListenerId(pub u64);

/// Listener registry. Handlers are returned in registration order.
#[derive(Default)]
pub struct Listeners {
    entries: Vec<(ListenerId, EventKind, EventHandler)>,
    next: u64,
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("count", &self.entries.len()).finish()
    }
}

impl Listeners {
    /// Register a handler.
    pub fn add(&mut self, kind: EventKind, handler: EventHandler) -> ListenerId {
        let id = ListenerId(self.next);
        self.next += 1;
        self.entries.push((id, kind, handler));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered for `kind`.
    pub fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(i, k, _)| !(*i == id && *k == kind));
        self.entries.len() != before
    }

    /// Handlers for `kind`, cloned so they can be called without holding a lock.
    pub fn for_kind(&self, kind: EventKind) -> Vec<EventHandler> {
        self.entries
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect()
    }

    /// Drop every handler.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Call handlers with the events collected under a lock.
pub fn dispatch(batch: Vec<(EventHandler, ViewEvent)>) {
    for (handler, event) in batch {
        handler(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_value(ViewEvent::new(EventKind::Select, "n1")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "select", "target": {"id": "n1"}}));
    }

    #[test]
    fn test_off_requires_matching_kind() {
        let mut listeners = Listeners::default();
        let id = listeners.add(EventKind::Select, Arc::new(|_| {}));
        assert!(!listeners.remove(EventKind::Unselect, id));
        assert_eq!(listeners.for_kind(EventKind::Select).len(), 1);
        assert!(listeners.remove(EventKind::Select, id));
        assert!(listeners.is_empty());
    }
}
