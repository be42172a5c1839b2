//! Timeline visibility filter.
//!
//! A time window hides elements whose timestamps fall outside it. Planning is a pure
//! function of the window and a graph ([`plan_visibility`]); the [`TimelineFilter`]
//! coalesces window changes and pushes the resulting hidden sets to every attached
//! [`VisibilityTarget`].
//!
//! ## Visibility Rules
//!
//! 1. No window: everything is visible
//! 2. A node is visible iff it has no parseable time, or its time is inside the window
//! 3. An edge is visible iff both endpoints are visible and, when it carries its own
//!    time, that time is inside the window
//!
//! ## Safety
//!
//! A non-null window that would leave zero visible nodes, counting nodes the user hid
//! by hand, is rejected: the target keeps its previous visibility, its view is reset,
//! and a transient [`Notice`] is raised.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::canonical::CanonicalKey;
use crate::config::ViewConfig;
use crate::normalize::AttributedGraph;
use crate::scheduler::{Executor, SinglePending};
use crate::types::{element_timestamp, ElementKind, TimeWindow};

/// Ids hidden in one view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HiddenSet {
    /// Hidden node ids.
    pub nodes: BTreeSet<String>,
    /// Hidden edge ids.
    pub edges: BTreeSet<String>,
}

impl HiddenSet {
    /// Nothing hidden.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the element with this key is hidden.
    pub fn contains(&self, key: &CanonicalKey) -> bool {
        match key.kind() {
            ElementKind::Node => self.nodes.contains(key.id()),
            ElementKind::Edge => self.edges.contains(key.id()),
        }
    }

    /// Whether a node id is hidden.
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    /// Whether an edge id is hidden.
    pub fn contains_edge(&self, id: &str) -> bool {
        self.edges.contains(id)
    }

    /// Hide an element. Returns `false` if it already was.
    pub fn insert(&mut self, key: &CanonicalKey) -> bool {
        match key.kind() {
            ElementKind::Node => self.nodes.insert(key.id().to_string()),
            ElementKind::Edge => self.edges.insert(key.id().to_string()),
        }
    }

    /// Show an element again. Returns `false` if it was not hidden.
    pub fn remove(&mut self, key: &CanonicalKey) -> bool {
        match key.kind() {
            ElementKind::Node => self.nodes.remove(key.id()),
            ElementKind::Edge => self.edges.remove(key.id()),
        }
    }

    /// Drop entries that no longer name an element of `graph`.
    pub fn retain_present(&mut self, graph: &AttributedGraph) {
        self.nodes.retain(|id| graph.node(id).is_some());
        self.edges.retain(|id| graph.edge(id).is_some());
    }

    /// Whether nothing is hidden.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Total hidden elements.
    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }
}

/// Error type for visibility planning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VisibilityError {
    /// The window would hide every node.
    #[error("Time window [{min}, {max}] would hide all {total} nodes")]
    WouldEmpty {
        /// Window lower bound.
        min: i64,
        /// Window upper bound.
        max: i64,
        /// Node count of the graph.
        total: usize,
    },
}

/// Accepted visibility computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibilityPlan {
    /// Elements to hide.
    pub hidden: HiddenSet,
    /// Nodes that stay visible.
    pub visible_nodes: usize,
    /// Edges that stay visible.
    pub visible_edges: usize,
}

/// Compute the window-hidden set for `window` over `graph`.
///
/// `manual` holds the elements the view already hides by hand; they count as hidden
/// when deciding whether anything would remain on screen but are not part of the
/// returned set. Fails with [`VisibilityError::WouldEmpty`] instead of returning a
/// plan under which the window hides the last visible node. An empty graph is never
/// rejected.
pub fn plan_visibility(
    window: Option<TimeWindow>,
    graph: &AttributedGraph,
    manual: &HiddenSet,
) -> Result<VisibilityPlan, VisibilityError> {
    let Some(window) = window else {
        let hidden = HiddenSet::new();
        let (visible_nodes, visible_edges) = count_visible(graph, &hidden, manual);
        return Ok(VisibilityPlan { hidden, visible_nodes, visible_edges });
    };

    let mut hidden = HiddenSet::new();
    for node in graph.nodes() {
        if let Some(ts) = element_timestamp(&node.attrs) {
            if !window.contains(ts) {
                hidden.nodes.insert(node.id.clone());
            }
        }
    }

    let visible_nodes = graph
        .nodes()
        .filter(|n| !hidden.contains_node(&n.id) && !manual.contains_node(&n.id))
        .count();
    // a window that only re-hides hand-hidden nodes did not empty the view
    let window_took_last = hidden.nodes.iter().any(|id| !manual.contains_node(id));
    if visible_nodes == 0 && window_took_last {
        return Err(VisibilityError::WouldEmpty {
            min: window.min,
            max: window.max,
            total: graph.node_count(),
        });
    }

    for edge in graph.edges() {
        let endpoints_visible =
            !hidden.nodes.contains(&edge.source) && !hidden.nodes.contains(&edge.target);
        let own_time_ok = element_timestamp(&edge.attrs).map_or(true, |ts| window.contains(ts));
        if !(endpoints_visible && own_time_ok) {
            hidden.edges.insert(edge.id.clone());
        }
    }

    let (visible_nodes, visible_edges) = count_visible(graph, &hidden, manual);
    Ok(VisibilityPlan { hidden, visible_nodes, visible_edges })
}

fn count_visible(graph: &AttributedGraph, hidden: &HiddenSet, manual: &HiddenSet) -> (usize, usize) {
    let node_shown = |id: &str| !hidden.contains_node(id) && !manual.contains_node(id);
    let nodes = graph.nodes().filter(|n| node_shown(&n.id)).count();
    let edges = graph
        .edges()
        .filter(|e| !hidden.contains_edge(&e.id) && !manual.contains_edge(&e.id))
        .filter(|e| node_shown(&e.source) && node_shown(&e.target))
        .count();
    (nodes, edges)
}

/// A view whose visibility the timeline controls.
pub trait VisibilityTarget: Send + Sync {
    /// Name used in logs and outcomes.
    fn target_name(&self) -> String;

    /// Current graph, or `None` if the view is gone.
    fn visibility_graph(&self) -> Option<AttributedGraph>;

    /// Elements the user hid by hand, which stay hidden whatever the window.
    fn manual_hidden(&self) -> HiddenSet {
        HiddenSet::new()
    }

    /// Replace the view's hidden set.
    fn apply_hidden(&self, hidden: &HiddenSet);

    /// Reset the viewport after a rejected update.
    fn recover(&self);
}

/// Notice severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Informational.
    Info,
    /// Something the user asked for was not done.
    Warning,
}

/// Transient, non-blocking message for the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Human-readable text.
    pub message: String,
    /// When the notice was raised.
    pub issued_at: DateTime<Utc>,
    /// How long the host should show it, in milliseconds.
    pub ttl_ms: u64,
}

impl Notice {
    /// When the notice stops being relevant.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.issued_at + ChronoDuration::milliseconds(self.ttl_ms as i64)
    }

    /// Whether the notice has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// Result of one recomputation for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VisibilityOutcome {
    /// The hidden set was applied.
    Applied {
        /// Target name.
        target: String,
        /// Hidden node count.
        hidden_nodes: usize,
        /// Hidden edge count.
        hidden_edges: usize,
    },
    /// The update was discarded and recovery ran.
    Rejected {
        /// Target name.
        target: String,
        /// Why.
        reason: String,
    },
    /// The target was gone.
    Skipped {
        /// Target name.
        target: String,
    },
}

type NoticeHandler = Arc<dyn Fn(&Notice) + Send + Sync>;

struct FilterShared {
    config: ViewConfig,
    targets: Mutex<Vec<Arc<dyn VisibilityTarget>>>,
    window: Mutex<Option<TimeWindow>>,
    notice_handlers: Mutex<Vec<NoticeHandler>>,
    outcomes: Mutex<Vec<VisibilityOutcome>>,
    recomputations: AtomicU64,
}

/// Coalescing visibility filter over any number of targets.
#[derive(Clone)]
pub struct TimelineFilter {
    shared: Arc<FilterShared>,
    scheduler: SinglePending,
}

impl std::fmt::Debug for TimelineFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineFilter")
            .field("window", &*self.shared.window.lock())
            .field("targets", &self.shared.targets.lock().len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl TimelineFilter {
    /// Create a filter that runs recomputations on `executor`.
    pub fn new(executor: Arc<dyn Executor>, config: ViewConfig) -> Self {
        Self {
            shared: Arc::new(FilterShared {
                config,
                targets: Mutex::new(Vec::new()),
                window: Mutex::new(None),
                notice_handlers: Mutex::new(Vec::new()),
                outcomes: Mutex::new(Vec::new()),
                recomputations: AtomicU64::new(0),
            }),
            scheduler: SinglePending::new(executor),
        }
    }

    /// Attach a view.
    pub fn attach(&self, target: Arc<dyn VisibilityTarget>) {
        self.shared.targets.lock().push(target);
    }

    /// Detach every view with this name. Returns how many were removed.
    pub fn detach(&self, name: &str) -> usize {
        let mut targets = self.shared.targets.lock();
        let before = targets.len();
        targets.retain(|t| t.target_name() != name);
        before - targets.len()
    }

    /// Listen for notices.
    pub fn on_notice<F>(&self, handler: F)
    where
        F: Fn(&Notice) + Send + Sync + 'static,
    {
        self.shared.notice_handlers.lock().push(Arc::new(handler));
    }

    /// Request a window change. Changes before the next run collapse into one.
    pub fn set_window(&self, window: Option<TimeWindow>) {
        *self.shared.window.lock() = window;
        let shared = Arc::clone(&self.shared);
        self.scheduler.request(move || {
            let window = *shared.window.lock();
            shared.recompute(window);
        });
    }

    /// Recompute immediately, dropping any pending coalesced run.
    pub fn apply_now(&self, window: Option<TimeWindow>) -> Vec<VisibilityOutcome> {
        self.scheduler.cancel();
        *self.shared.window.lock() = window;
        self.shared.recompute(window)
    }

    /// Most recently requested window.
    pub fn window(&self) -> Option<TimeWindow> {
        *self.shared.window.lock()
    }

    /// Outcomes of the last recomputation.
    pub fn last_outcomes(&self) -> Vec<VisibilityOutcome> {
        self.shared.outcomes.lock().clone()
    }

    /// How many recomputations have run.
    pub fn recomputations(&self) -> u64 {
        self.shared.recomputations.load(Ordering::SeqCst)
    }

    /// Drop pending work and every target.
    pub fn shutdown(&self) {
        self.scheduler.cancel();
        self.shared.targets.lock().clear();
    }
}

impl FilterShared {
    fn recompute(&self, window: Option<TimeWindow>) -> Vec<VisibilityOutcome> {
        self.recomputations.fetch_add(1, Ordering::SeqCst);
        let targets: Vec<Arc<dyn VisibilityTarget>> = self.targets.lock().clone();

        let mut outcomes = Vec::with_capacity(targets.len());
        let mut rejected = false;
        for target in targets {
            let name = target.target_name();
            let Some(graph) = target.visibility_graph() else {
                outcomes.push(VisibilityOutcome::Skipped { target: name });
                continue;
            };
            match plan_visibility(window, &graph, &target.manual_hidden()) {
                Ok(plan) => {
                    target.apply_hidden(&plan.hidden);
                    outcomes.push(VisibilityOutcome::Applied {
                        target: name,
                        hidden_nodes: plan.hidden.nodes.len(),
                        hidden_edges: plan.hidden.edges.len(),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        target_view = %name,
                        error = %e,
                        "Discarding visibility update that would empty the view"
                    );
                    target.recover();
                    rejected = true;
                    outcomes.push(VisibilityOutcome::Rejected { target: name, reason: e.to_string() });
                }
            }
        }

        if rejected {
            self.raise(Notice {
                level: NoticeLevel::Warning,
                message: "No elements fall inside the selected time range; showing the previous view"
                    .to_string(),
                issued_at: Utc::now(),
                ttl_ms: self.config.notice_ttl_ms,
            });
        }

        *self.outcomes.lock() = outcomes.clone();
        outcomes
    }

    fn raise(&self, notice: Notice) {
        let handlers: Vec<NoticeHandler> = self.notice_handlers.lock().clone();
        for handler in handlers {
            handler(&notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::scheduler::ManualExecutor;
    use crate::types::ElementSnapshot;
    use std::sync::atomic::AtomicUsize;

    // ─────────────────────────────────────────────────────────────────────────
    // Test Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn timed_graph() -> AttributedGraph {
        normalize(&[
            ElementSnapshot::node("early").with_attr("start", 5),
            ElementSnapshot::node("late").with_attr("start", 50),
            ElementSnapshot::node("timeless"),
            ElementSnapshot::edge("early", "timeless"),
            ElementSnapshot::edge("late", "timeless"),
            ElementSnapshot::edge_with_id("stale", "early", "timeless").with_attr("time", 99),
        ])
    }

    struct RecordingTarget {
        graph: AttributedGraph,
        manual: HiddenSet,
        applied: Mutex<Vec<HiddenSet>>,
        recovered: AtomicUsize,
    }

    impl RecordingTarget {
        fn new(graph: AttributedGraph) -> Arc<Self> {
            Self::with_manual(graph, HiddenSet::new())
        }

        fn with_manual(graph: AttributedGraph, manual: HiddenSet) -> Arc<Self> {
            Arc::new(Self {
                graph,
                manual,
                applied: Mutex::new(Vec::new()),
                recovered: AtomicUsize::new(0),
            })
        }
    }

    impl VisibilityTarget for RecordingTarget {
        fn target_name(&self) -> String {
            "recording".into()
        }
        fn visibility_graph(&self) -> Option<AttributedGraph> {
            Some(self.graph.clone())
        }
        fn manual_hidden(&self) -> HiddenSet {
            self.manual.clone()
        }
        fn apply_hidden(&self, hidden: &HiddenSet) {
            self.applied.lock().push(hidden.clone());
        }
        fn recover(&self) {
            self.recovered.fetch_add(1, Ordering::SeqCst);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Planning
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_no_window_hides_nothing() {
        let plan = plan_visibility(None, &timed_graph(), &HiddenSet::new()).unwrap();
        assert!(plan.hidden.is_empty());
        assert_eq!(plan.visible_nodes, 3);
    }

    #[test]
    fn test_window_rules() {
        let plan = plan_visibility(Some(TimeWindow::new(0, 10)), &timed_graph(), &HiddenSet::new()).unwrap();
        assert_eq!(plan.hidden.nodes, BTreeSet::from(["late".to_string()]));
        // late's edge loses an endpoint; stale carries its own out-of-window time
        assert_eq!(
            plan.hidden.edges,
            BTreeSet::from(["late|timeless".to_string(), "stale".to_string()])
        );
        assert_eq!(plan.visible_nodes, 2);
        assert_eq!(plan.visible_edges, 1);
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let plan = plan_visibility(Some(TimeWindow::new(5, 50)), &timed_graph(), &HiddenSet::new()).unwrap();
        assert!(plan.hidden.nodes.is_empty());
    }

    #[test]
    fn test_rejects_window_that_empties_graph() {
        let graph = normalize(&[
            ElementSnapshot::node("a").with_attr("start", 20),
            ElementSnapshot::node("b").with_attr("start", 20),
        ]);
        let err =
            plan_visibility(Some(TimeWindow::new(0, 10)), &graph, &HiddenSet::new()).unwrap_err();
        assert_eq!(err, VisibilityError::WouldEmpty { min: 0, max: 10, total: 2 });
    }

    #[test]
    fn test_manual_hides_count_towards_emptiness() {
        let mut manual = HiddenSet::new();
        manual.insert(&CanonicalKey::node("timeless"));

        // the window hides `late`, the user hid `timeless`: only `early` is left
        let plan = plan_visibility(Some(TimeWindow::new(0, 10)), &timed_graph(), &manual).unwrap();
        assert_eq!(plan.visible_nodes, 1);
        assert_eq!(plan.visible_edges, 0);
        // hand-hidden elements are not folded into the window set
        assert!(!plan.hidden.contains_node("timeless"));

        manual.insert(&CanonicalKey::node("early"));
        let err = plan_visibility(Some(TimeWindow::new(0, 10)), &timed_graph(), &manual)
            .unwrap_err();
        assert_eq!(err, VisibilityError::WouldEmpty { min: 0, max: 10, total: 3 });
    }

    #[test]
    fn test_window_alone_never_blamed_for_manual_hides() {
        let mut manual = HiddenSet::new();
        for id in ["early", "late", "timeless"] {
            manual.insert(&CanonicalKey::node(id));
        }
        // everything is already hidden by hand; a window hiding only `late` is accepted
        let plan = plan_visibility(Some(TimeWindow::new(0, 10)), &timed_graph(), &manual).unwrap();
        assert_eq!(plan.visible_nodes, 0);
        assert!(plan_visibility(None, &timed_graph(), &manual).is_ok());
    }

    #[test]
    fn test_hidden_set_is_kind_aware() {
        let mut hidden = HiddenSet::new();
        assert!(hidden.insert(&CanonicalKey::edge("x")));
        assert!(!hidden.insert(&CanonicalKey::edge("x")));
        assert!(hidden.contains(&CanonicalKey::edge("x")));
        assert!(!hidden.contains(&CanonicalKey::node("x")));
        assert!(hidden.remove(&CanonicalKey::edge("x")));
        assert!(hidden.is_empty());
    }

    #[test]
    fn test_empty_graph_is_not_rejected() {
        let plan =
            plan_visibility(Some(TimeWindow::new(0, 10)), &AttributedGraph::new(), &HiddenSet::new())
                .unwrap();
        assert_eq!(plan.visible_nodes, 0);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Filter
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_window_changes_coalesce() {
        let executor = Arc::new(ManualExecutor::new());
        let filter = TimelineFilter::new(executor.clone(), ViewConfig::default());
        let target = RecordingTarget::new(timed_graph());
        filter.attach(target.clone());

        for max in [10, 20, 30, 100] {
            filter.set_window(Some(TimeWindow::new(0, max)));
        }
        assert_eq!(filter.recomputations(), 0);
        executor.run_pending();

        assert_eq!(filter.recomputations(), 1);
        let applied = target.applied.lock();
        assert_eq!(applied.len(), 1);
        // only the last window (0..100) ran: nothing hidden
        assert!(applied[0].is_empty());
    }

    #[test]
    fn test_rejection_keeps_state_and_raises_notice() {
        let filter = TimelineFilter::new(Arc::new(ManualExecutor::new()), ViewConfig::default());
        let graph = normalize(&[ElementSnapshot::node("a").with_attr("start", 20)]);
        let target = RecordingTarget::new(graph);
        filter.attach(target.clone());

        let notices = Arc::new(Mutex::new(Vec::new()));
        let n = Arc::clone(&notices);
        filter.on_notice(move |notice| n.lock().push(notice.clone()));

        let outcomes = filter.apply_now(Some(TimeWindow::new(0, 10)));
        assert!(matches!(outcomes[0], VisibilityOutcome::Rejected { .. }));
        assert!(target.applied.lock().is_empty());
        assert_eq!(target.recovered.load(Ordering::SeqCst), 1);

        let notices = notices.lock();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(!notices[0].is_expired(notices[0].issued_at));
        assert!(notices[0].is_expired(notices[0].expires_at()));
    }

    #[test]
    fn test_filter_rejects_window_that_empties_with_manual_hides() {
        let filter = TimelineFilter::new(Arc::new(ManualExecutor::new()), ViewConfig::default());
        let mut manual = HiddenSet::new();
        manual.insert(&CanonicalKey::node("early"));
        manual.insert(&CanonicalKey::node("timeless"));
        let target = RecordingTarget::with_manual(timed_graph(), manual);
        filter.attach(target.clone());

        let outcomes = filter.apply_now(Some(TimeWindow::new(40, 60)));
        assert!(matches!(outcomes[0], VisibilityOutcome::Applied { .. }));

        let outcomes = filter.apply_now(Some(TimeWindow::new(0, 10)));
        assert!(matches!(outcomes[0], VisibilityOutcome::Rejected { .. }));
        assert_eq!(target.applied.lock().len(), 1);
        assert_eq!(target.recovered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detach_by_name() {
        let filter = TimelineFilter::new(Arc::new(ManualExecutor::new()), ViewConfig::default());
        filter.attach(RecordingTarget::new(timed_graph()));
        assert_eq!(filter.detach("recording"), 1);
        assert!(filter.apply_now(None).is_empty());
    }
}
