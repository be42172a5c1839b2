//! Session-wide selection service.
//!
//! A [`SelectionManager`] owns the authoritative Selection Set for one open document.
//! It is constructed by the host and injected into every mounted view; views never
//! mutate the set directly.
//!
//! ## Protocol
//!
//! ```text
//! gesture → view records key in EchoSuppressor → manager.select()
//!                                                    ↓ (sync, registration order)
//!                             every subscriber ← SelectionChange
//!                                   ↓
//!           originating view consumes its echo; other views apply with Origin::Remote
//! ```
//!
//! Notifications are delivered synchronously, before `select`/`unselect` returns, and
//! after the internal lock is released so subscribers may read the manager.
//!
//! ## Channels
//!
//! [`SelectionManager::subscribe`] listens on the `change` channel and is handed an
//! [`SelectionAction::Init`] carrying the current set before it returns, so late
//! subscribers start in sync. [`SelectionManager::on`] listens on one named channel
//! (`select`, `unselect`, `clear` or `change`) without replay. For each mutation the
//! specific channel fires first, then `change`.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::canonical::{canonical_key, CanonicalKey};
use crate::types::ElementSnapshot;

/// Where a selection change came from.
///
/// `Local` changes originate in the view itself (a gesture or an imperative call) and
/// are propagated to the manager. `Remote` changes arrived from the manager and are
/// applied to the view only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Origin {
    /// Originated in this view.
    Local,
    /// Rebroadcast from the selection manager.
    Remote,
}

/// Kind of selection mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionAction {
    /// Current set, delivered once to a new subscriber.
    Init,
    /// One element was added.
    Select,
    /// One element was removed.
    Unselect,
    /// The set was emptied.
    Clear,
    /// The set was replaced wholesale.
    Set,
}

/// Named notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionEvent {
    /// Every mutation.
    Change,
    /// Single-element selects.
    Select,
    /// Single-element unselects.
    Unselect,
    /// The set was emptied.
    Clear,
}

impl SelectionEvent {
    /// Parse a channel name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "change" => Some(Self::Change),
            "select" => Some(Self::Select),
            "unselect" => Some(Self::Unselect),
            "clear" => Some(Self::Clear),
            _ => None,
        }
    }

    /// Channel name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change => "change",
            Self::Select => "select",
            Self::Unselect => "unselect",
            Self::Clear => "clear",
        }
    }

    /// Specific channel for an action, if it has one besides `change`.
    fn for_action(action: SelectionAction) -> Option<Self> {
        match action {
            SelectionAction::Select => Some(Self::Select),
            SelectionAction::Unselect => Some(Self::Unselect),
            SelectionAction::Clear => Some(Self::Clear),
            SelectionAction::Init | SelectionAction::Set => None,
        }
    }
}

impl std::fmt::Display for SelectionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification payload.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionChange {
    /// What happened.
    pub action: SelectionAction,
    /// Key of the element acted on (select/unselect only).
    pub key: Option<CanonicalKey>,
    /// Snapshot of the element acted on (select/unselect only).
    pub element: Option<ElementSnapshot>,
    /// Selection Set after the change, in selection order.
    pub selected: Vec<ElementSnapshot>,
}

type Callback = Arc<dyn Fn(&SelectionChange) + Send + Sync>;

struct State {
    entries: Vec<(CanonicalKey, ElementSnapshot)>,
    subscribers: Vec<(u64, SelectionEvent, Callback)>,
    next_subscriber: u64,
}

impl State {
    fn position(&self, key: &CanonicalKey) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    fn snapshots(&self) -> Vec<ElementSnapshot> {
        self.entries.iter().map(|(_, s)| s.clone()).collect()
    }
}

struct Shared {
    session: Uuid,
    state: Mutex<State>,
}

/// The selection service. Cheap to clone; clones share one Selection Set.
#[derive(Clone)]
pub struct SelectionManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SelectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SelectionManager")
            .field("session", &self.shared.session)
            .field("selected", &state.entries.len())
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}

impl Default for SelectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`SelectionManager::subscribe`] and [`SelectionManager::on`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    shared: Weak<Shared>,
}

impl Subscription {
    /// Stop receiving notifications. Returns `false` if already removed.
    pub fn unsubscribe(&self) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let mut state = shared.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(id, _, _)| *id != self.id);
        state.subscribers.len() != before
    }
}

impl SelectionManager {
    /// Create a manager with a fresh session id and an empty set.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                session: Uuid::new_v4(),
                state: Mutex::new(State {
                    entries: Vec::new(),
                    subscribers: Vec::new(),
                    next_subscriber: 0,
                }),
            }),
        }
    }

    /// Session id, for log correlation.
    pub fn session_id(&self) -> Uuid {
        self.shared.session
    }

    /// Register a `change` listener. Listeners are notified in registration order.
    ///
    /// The callback receives an [`SelectionAction::Init`] with the current set before
    /// this returns.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&SelectionChange) + Send + Sync + 'static,
    {
        let callback: Callback = Arc::new(callback);
        let (subscription, init) = {
            let mut state = self.shared.state.lock();
            let subscription = Self::register(
                &mut state,
                &self.shared,
                SelectionEvent::Change,
                Arc::clone(&callback),
            );
            let init = SelectionChange {
                action: SelectionAction::Init,
                key: None,
                element: None,
                selected: state.snapshots(),
            };
            (subscription, init)
        };
        callback(&init);
        subscription
    }

    /// Register a listener on one channel. Nothing is replayed.
    pub fn on<F>(&self, event: SelectionEvent, callback: F) -> Subscription
    where
        F: Fn(&SelectionChange) + Send + Sync + 'static,
    {
        let mut state = self.shared.state.lock();
        Self::register(&mut state, &self.shared, event, Arc::new(callback))
    }

    /// Remove a listener registered with [`on`](Self::on) or
    /// [`subscribe`](Self::subscribe). Returns `false` if already removed.
    pub fn off(&self, subscription: &Subscription) -> bool {
        subscription.unsubscribe()
    }

    fn register(
        state: &mut State,
        shared: &Arc<Shared>,
        event: SelectionEvent,
        callback: Callback,
    ) -> Subscription {
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.push((id, event, callback));
        Subscription { id, shared: Arc::downgrade(shared) }
    }

    /// Number of active listeners.
    pub fn subscriber_count(&self) -> usize {
        self.shared.state.lock().subscribers.len()
    }

    /// Add an element. No-op (returns `false`) if already selected or malformed.
    pub fn select(&self, element: &ElementSnapshot) -> bool {
        self.select_with(element, false)
    }

    /// Add an element and notify even if it is already selected.
    pub fn select_forced(&self, element: &ElementSnapshot) -> bool {
        self.select_with(element, true)
    }

    /// Remove an element. No-op (returns `false`) if not selected or malformed.
    pub fn unselect(&self, element: &ElementSnapshot) -> bool {
        self.unselect_with(element, false)
    }

    /// Remove an element and notify even if it was not selected.
    pub fn unselect_forced(&self, element: &ElementSnapshot) -> bool {
        self.unselect_with(element, true)
    }

    /// Flip membership. Returns whether the element is selected afterwards.
    pub fn toggle(&self, element: &ElementSnapshot) -> bool {
        let Some(key) = canonical_key(element) else {
            return false;
        };
        if self.is_selected(&key) {
            self.unselect(element);
            false
        } else {
            self.select(element)
        }
    }

    fn select_with(&self, element: &ElementSnapshot, force: bool) -> bool {
        let Some(key) = canonical_key(element) else {
            tracing::debug!(session = %self.shared.session, "Ignoring select of malformed element");
            return false;
        };
        let change = {
            let mut state = self.shared.state.lock();
            match state.position(&key) {
                Some(_) if !force => return false,
                Some(idx) => state.entries[idx].1 = element.clone(),
                None => state.entries.push((key.clone(), element.clone())),
            }
            SelectionChange {
                action: SelectionAction::Select,
                key: Some(key),
                element: Some(element.clone()),
                selected: state.snapshots(),
            }
        };
        self.notify(&change);
        true
    }

    fn unselect_with(&self, element: &ElementSnapshot, force: bool) -> bool {
        let Some(key) = canonical_key(element) else {
            tracing::debug!(session = %self.shared.session, "Ignoring unselect of malformed element");
            return false;
        };
        let change = {
            let mut state = self.shared.state.lock();
            match state.position(&key) {
                Some(idx) => {
                    state.entries.remove(idx);
                }
                None if !force => return false,
                None => {}
            }
            SelectionChange {
                action: SelectionAction::Unselect,
                key: Some(key),
                element: Some(element.clone()),
                selected: state.snapshots(),
            }
        };
        self.notify(&change);
        true
    }

    /// Empty the set. No-op (returns `false`) if already empty.
    pub fn clear(&self) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.entries.is_empty() {
                return false;
            }
            state.entries.clear();
        }
        self.notify(&SelectionChange {
            action: SelectionAction::Clear,
            key: None,
            element: None,
            selected: Vec::new(),
        });
        true
    }

    /// Replace the set. Malformed and duplicate elements are skipped.
    ///
    /// Notifies once, and only if the resulting key sequence differs.
    pub fn set_selection(&self, elements: &[ElementSnapshot]) -> bool {
        let mut next: Vec<(CanonicalKey, ElementSnapshot)> = Vec::new();
        for el in elements {
            if let Some(key) = canonical_key(el) {
                if !next.iter().any(|(k, _)| *k == key) {
                    next.push((key, el.clone()));
                }
            }
        }
        let change = {
            let mut state = self.shared.state.lock();
            let unchanged = state.entries.len() == next.len()
                && state.entries.iter().zip(&next).all(|((a, _), (b, _))| a == b);
            if unchanged {
                return false;
            }
            state.entries = next;
            SelectionChange {
                action: SelectionAction::Set,
                key: None,
                element: None,
                selected: state.snapshots(),
            }
        };
        self.notify(&change);
        true
    }

    /// Current Selection Set, in selection order.
    pub fn get_selection(&self) -> Vec<ElementSnapshot> {
        self.shared.state.lock().snapshots()
    }

    /// Canonical keys of the current set, in selection order.
    pub fn keys(&self) -> Vec<CanonicalKey> {
        self.shared.state.lock().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Whether a key is selected.
    pub fn is_selected(&self, key: &CanonicalKey) -> bool {
        self.shared.state.lock().position(key).is_some()
    }

    /// Size of the set.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, change: &SelectionChange) {
        let specific = SelectionEvent::for_action(change.action);
        let subscribers: Vec<Callback> = {
            let state = self.shared.state.lock();
            let mut picked = Vec::new();
            for event in specific.into_iter().chain([SelectionEvent::Change]) {
                picked.extend(
                    state
                        .subscribers
                        .iter()
                        .filter(|(_, e, _)| *e == event)
                        .map(|(_, _, cb)| Arc::clone(cb)),
                );
            }
            picked
        };
        tracing::trace!(
            session = %self.shared.session,
            action = ?change.action,
            selected = change.selected.len(),
            subscribers = subscribers.len(),
            "Broadcasting selection change"
        );
        for callback in subscribers {
            callback(change);
        }
    }
}

/// Counted multiset of keys a view expects to hear back from the manager.
///
/// A view records a key before calling the manager and consumes one entry when the
/// matching notification arrives, so its own changes are not re-applied.
#[derive(Debug, Clone, Default)]
pub struct EchoSuppressor {
    pending: BTreeMap<CanonicalKey, usize>,
}

impl EchoSuppressor {
    /// Create an empty suppressor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect one echo for `key`.
    pub fn record(&mut self, key: CanonicalKey) {
        *self.pending.entry(key).or_insert(0) += 1;
    }

    /// Consume one expected echo. Returns `true` if the notification was our own.
    pub fn consume(&mut self, key: &CanonicalKey) -> bool {
        match self.pending.get_mut(key) {
            Some(n) if *n > 1 => {
                *n -= 1;
                true
            }
            Some(_) => {
                self.pending.remove(key);
                true
            }
            None => false,
        }
    }

    /// Total outstanding echoes.
    pub fn outstanding(&self) -> usize {
        self.pending.values().sum()
    }

    /// Forget all expected echoes.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// What a view should do with a notification after echo suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteApply {
    /// The view's own change coming back; do nothing.
    Echo,
    /// Select this element with [`Origin::Remote`].
    Select(CanonicalKey),
    /// Unselect this element with [`Origin::Remote`].
    Unselect(CanonicalKey),
    /// Make the view's selection exactly these keys with [`Origin::Remote`].
    Replace(Vec<CanonicalKey>),
}

impl EchoSuppressor {
    /// Decide how a view handles `change`, consuming an echo if it is one.
    pub fn filter(&mut self, change: &SelectionChange) -> RemoteApply {
        match (change.action, &change.key) {
            (SelectionAction::Select, Some(key)) | (SelectionAction::Unselect, Some(key))
                if self.consume(key) =>
            {
                RemoteApply::Echo
            }
            (SelectionAction::Select, Some(key)) => RemoteApply::Select(key.clone()),
            (SelectionAction::Unselect, Some(key)) => RemoteApply::Unselect(key.clone()),
            _ => {
                self.clear();
                RemoteApply::Replace(change.selected.iter().filter_map(canonical_key).collect())
            }
        }
    }
}
