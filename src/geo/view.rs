//! Geographic view of the element set.
//!
//! Nodes are drawn at their `lat`/`lng` attributes; edges go through the projector.
//! Elements without finite coordinates are left out of the drawing but still take part
//! in selection and visibility. The view joins a [`SelectionManager`] exactly like a
//! graph adapter does, so the two stay in sync without echo loops.
//!
//! The map viewport starts fitted to the drawable nodes and is refitted whenever the
//! timeline rejects a window, the same recovery the graph views perform.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;

use crate::canonical::{string_to_color, CanonicalKey};
use crate::config::ViewConfig;
use crate::events::{dispatch, EventHandler, EventKind, ListenerId, Listeners, ViewEvent};
use crate::geo::markers::{arrowhead, LabelPlacement, LabelSlots, SeamSlots};
use crate::geo::projector::project;
use crate::normalize::{AttributedGraph, NodeRecord};
use crate::selection::{EchoSuppressor, Origin, RemoteApply, SelectionManager, Subscription};
use crate::timeline::{HiddenSet, VisibilityTarget};
use crate::types::{attr_number, attr_str, ElementSnapshot, LatLng, Marker, Segment};

const SELECTED_EDGE_COLOR: &str = "yellow";
const DEFAULT_EDGE_COLOR: &str = "purple";

/// Map view shown when there is nothing to fit.
pub const DEFAULT_GEO_CENTER: LatLng = LatLng { lat: 20.505, lng: 22.0 };
/// Zoom shown when there is nothing to fit.
pub const DEFAULT_GEO_ZOOM: f64 = 2.4;
/// Fraction of the bounds' span added on every side when fitting.
pub const FIT_PAD: f64 = 0.2;
const MIN_GEO_ZOOM: f64 = 1.0;
const MAX_GEO_ZOOM: f64 = 18.0;

/// Map viewport: center, zoom and the bounds it was last fitted to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoViewport {
    /// Map center.
    pub center: LatLng,
    /// Tile zoom level.
    pub zoom: f64,
    /// Padded south-west and north-east corners of the last fit.
    pub bounds: Option<(LatLng, LatLng)>,
}

impl Default for GeoViewport {
    fn default() -> Self {
        Self { center: DEFAULT_GEO_CENTER, zoom: DEFAULT_GEO_ZOOM, bounds: None }
    }
}

impl GeoViewport {
    /// Viewport fitted to `points`, padded by [`FIT_PAD`]. Without points, the default view.
    pub fn fitted(points: impl IntoIterator<Item = LatLng>) -> Self {
        let corners = points.into_iter().fold(None, |acc: Option<(LatLng, LatLng)>, p| {
            Some(match acc {
                None => (p, p),
                Some((sw, ne)) => (
                    LatLng::new(sw.lat.min(p.lat), sw.lng.min(p.lng)),
                    LatLng::new(ne.lat.max(p.lat), ne.lng.max(p.lng)),
                ),
            })
        });
        let Some((sw, ne)) = corners else {
            return Self::default();
        };
        let pad_lat = (ne.lat - sw.lat) * FIT_PAD;
        let pad_lng = (ne.lng - sw.lng) * FIT_PAD;
        let sw = LatLng::new((sw.lat - pad_lat).max(-90.0), (sw.lng - pad_lng).max(-180.0));
        let ne = LatLng::new((ne.lat + pad_lat).min(90.0), (ne.lng + pad_lng).min(180.0));

        // each zoom level halves the visible span of the 360° world
        let span = (ne.lng - sw.lng).max((ne.lat - sw.lat) * 2.0);
        let zoom = if span > f64::EPSILON {
            (360.0 / span).log2().clamp(MIN_GEO_ZOOM, MAX_GEO_ZOOM)
        } else {
            MAX_GEO_ZOOM
        };
        Self {
            center: LatLng::new((sw.lat + ne.lat) / 2.0, (sw.lng + ne.lng) / 2.0),
            zoom,
            bounds: Some((sw, ne)),
        }
    }
}

/// A drawn node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoNodePoint {
    /// Node id.
    pub id: String,
    /// Where it is drawn.
    pub position: LatLng,
    /// Fill color.
    pub color: String,
    /// Circle radius.
    pub radius: f64,
    /// Display label.
    pub label: String,
    /// Whether the node is selected.
    pub selected: bool,
}

/// A drawn edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoEdgeShape {
    /// Edge id.
    pub id: String,
    /// Polyline pieces (two when crossing the antimeridian).
    pub segments: Vec<Segment>,
    /// Stroke color.
    pub color: String,
    /// Stroke weight.
    pub weight: f64,
    /// Whether the edge is selected.
    pub selected: bool,
    /// Whether an arrowhead was drawn.
    pub directed: bool,
}

/// A relationship label at an edge midpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoLabel {
    /// Edge id.
    pub edge_id: String,
    /// Text.
    pub text: String,
    /// Position and rotation.
    pub placement: LabelPlacement,
}

/// One render pass of the geographic view.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeoFrame {
    /// Visible nodes with coordinates.
    pub nodes: Vec<GeoNodePoint>,
    /// Visible edges between drawable nodes.
    pub edges: Vec<GeoEdgeShape>,
    /// Chevrons (de-overlapped) and arrowheads.
    pub markers: Vec<Marker>,
    /// Relationship labels.
    pub labels: Vec<GeoLabel>,
    /// Visible nodes left out for lack of coordinates.
    pub skipped_nodes: usize,
    /// Map viewport at render time.
    pub view: GeoViewport,
}

/// Coordinates of a node, if both are finite.
pub fn node_coordinates(node: &NodeRecord) -> Option<LatLng> {
    let lat = attr_number(&node.attrs, "lat")?;
    let lng = attr_number(&node.attrs, "lng")?;
    Some(LatLng::new(lat, lng))
}

struct GeoState {
    graph: AttributedGraph,
    selected: BTreeSet<CanonicalKey>,
    hidden: HiddenSet,
    viewport: GeoViewport,
    echo: EchoSuppressor,
    listeners: Listeners,
    destroyed: bool,
}

struct GeoShared {
    config: ViewConfig,
    state: Mutex<GeoState>,
    selection: Option<SelectionManager>,
    subscription: Mutex<Option<Subscription>>,
}

/// The geographic view.
#[derive(Clone)]
pub struct GeoMapView {
    shared: Arc<GeoShared>,
}

impl std::fmt::Debug for GeoMapView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("GeoMapView")
            .field("nodes", &state.graph.node_count())
            .field("edges", &state.graph.edge_count())
            .field("selected", &state.selected.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl GeoMapView {
    /// Build the view and join the selection session, if one is given.
    ///
    /// Elements already selected in the session are reflected immediately.
    pub fn new(
        elements: &[ElementSnapshot],
        selection: Option<SelectionManager>,
        config: ViewConfig,
    ) -> Self {
        let (graph, report) = AttributedGraph::from_elements(elements);
        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            dropped_nodes = report.dropped_nodes,
            dropped_edges = report.dropped_edges,
            "Geo view built"
        );
        let view = Self {
            shared: Arc::new(GeoShared {
                config,
                state: Mutex::new(GeoState {
                    viewport: GeoViewport::fitted(graph.nodes().filter_map(node_coordinates)),
                    graph,
                    selected: BTreeSet::new(),
                    hidden: HiddenSet::new(),
                    echo: EchoSuppressor::new(),
                    listeners: Listeners::default(),
                    destroyed: false,
                }),
                selection,
                subscription: Mutex::new(None),
            }),
        };

        if let Some(manager) = &view.shared.selection {
            let weak: Weak<GeoShared> = Arc::downgrade(&view.shared);
            let subscription = manager.subscribe(move |change| {
                if let Some(shared) = weak.upgrade() {
                    let apply = shared.state.lock().echo.filter(change);
                    GeoMapView { shared }.apply_remote(apply);
                }
            });
            // the Init replay has already synced the existing selection
            *view.shared.subscription.lock() = Some(subscription);
        }
        view
    }

    fn lookup(&self, id: &str) -> Option<CanonicalKey> {
        self.shared.state.lock().graph.lookup(id)
    }

    /// Click gesture on a bare id (nodes first): toggles the element's selection.
    pub fn click(&self, id: &str) -> bool {
        let Some(key) = self.lookup(id) else {
            return false;
        };
        let select = !self.is_key_selected(&key);
        self.set_selected(&key, select, Origin::Local)
    }

    /// Select the element with a bare id, nodes first (local origin). Unknown ids
    /// return `false`.
    pub fn select(&self, id: &str) -> bool {
        self.lookup(id).is_some_and(|key| self.select_key(&key))
    }

    /// Unselect the element with a bare id, nodes first (local origin).
    pub fn unselect(&self, id: &str) -> bool {
        self.lookup(id).is_some_and(|key| self.set_selected(&key, false, Origin::Local))
    }

    /// Select the element with this key (local origin).
    pub fn select_key(&self, key: &CanonicalKey) -> bool {
        self.set_selected(key, true, Origin::Local)
    }

    /// Whether the element with a bare id (nodes first) is selected in this view.
    pub fn is_selected(&self, id: &str) -> bool {
        self.lookup(id).is_some_and(|key| self.is_key_selected(&key))
    }

    /// Whether the element with this key is selected in this view.
    pub fn is_key_selected(&self, key: &CanonicalKey) -> bool {
        self.shared.state.lock().selected.contains(key)
    }

    /// Selected keys, sorted.
    pub fn selected_keys(&self) -> Vec<CanonicalKey> {
        self.shared.state.lock().selected.iter().cloned().collect()
    }

    /// Current map viewport.
    pub fn viewport(&self) -> GeoViewport {
        self.shared.state.lock().viewport
    }

    /// Pan and zoom the map. Non-finite input is ignored.
    pub fn set_view(&self, center: LatLng, zoom: f64) {
        if !(center.is_finite() && zoom.is_finite()) {
            return;
        }
        let mut state = self.shared.state.lock();
        state.viewport = GeoViewport {
            center,
            zoom: zoom.clamp(MIN_GEO_ZOOM, MAX_GEO_ZOOM),
            bounds: None,
        };
    }

    /// Fit the map to the visible nodes with coordinates.
    pub fn fit_bounds(&self) {
        let mut state = self.shared.state.lock();
        if state.destroyed {
            return;
        }
        let GeoState { graph, hidden, viewport, .. } = &mut *state;
        *viewport = GeoViewport::fitted(
            graph.nodes().filter(|n| !hidden.contains_node(&n.id)).filter_map(node_coordinates),
        );
    }

    /// Subscribe to select/unselect events.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&ViewEvent) + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        self.shared.state.lock().listeners.add(kind, handler)
    }

    /// Unsubscribe.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.state.lock().listeners.remove(kind, id)
    }

    /// Replace the element set, keeping selection for ids that survive.
    pub fn set_elements(&self, elements: &[ElementSnapshot]) {
        let mut state = self.shared.state.lock();
        let (graph, _) = AttributedGraph::from_elements(elements);
        let GeoState { selected, hidden, .. } = &mut *state;
        selected.retain(|key| graph.contains(key));
        hidden.retain_present(&graph);
        state.graph = graph;
    }

    /// Leave the selection session and drop listeners. Idempotent.
    pub fn destroy(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.listeners.clear();
            state.echo.clear();
        }
        if let Some(subscription) = self.shared.subscription.lock().take() {
            subscription.unsubscribe();
        }
    }

    fn set_selected(&self, key: &CanonicalKey, select: bool, origin: Origin) -> bool {
        let (snapshot, batch) = {
            let mut state = self.shared.state.lock();
            if state.destroyed || !state.graph.contains(key) {
                return false;
            }
            let changed = if select {
                state.selected.insert(key.clone())
            } else {
                state.selected.remove(key)
            };
            if !changed {
                return false;
            }
            let kind = if select { EventKind::Select } else { EventKind::Unselect };
            let batch: Vec<_> = state
                .listeners
                .for_kind(kind)
                .into_iter()
                .map(|h| (h, ViewEvent::new(kind, key.id())))
                .collect();
            let snapshot = state.graph.snapshot(key);
            (snapshot, batch)
        };
        dispatch(batch);

        if origin == Origin::Local {
            if let (Some(manager), Some(snapshot)) = (&self.shared.selection, snapshot) {
                self.propagate(manager, &snapshot, select);
            }
        }
        true
    }

    fn propagate(&self, manager: &SelectionManager, snapshot: &ElementSnapshot, select: bool) {
        let Some(key) = crate::canonical::canonical_key(snapshot) else {
            return;
        };
        self.shared.state.lock().echo.record(key.clone());
        let notified = if select { manager.select(snapshot) } else { manager.unselect(snapshot) };
        if !notified {
            self.shared.state.lock().echo.consume(&key);
        }
    }

    fn apply_remote(&self, apply: RemoteApply) {
        // keys this view does not hold are skipped by set_selected
        match apply {
            RemoteApply::Echo => {}
            RemoteApply::Select(key) => {
                self.set_selected(&key, true, Origin::Remote);
            }
            RemoteApply::Unselect(key) => {
                self.set_selected(&key, false, Origin::Remote);
            }
            RemoteApply::Replace(keys) => {
                let wanted: BTreeSet<CanonicalKey> = keys.into_iter().collect();
                for key in self.selected_keys().iter().filter(|k| !wanted.contains(*k)) {
                    self.set_selected(key, false, Origin::Remote);
                }
                for key in &wanted {
                    self.set_selected(key, true, Origin::Remote);
                }
            }
        }
    }

    /// Draw the current state.
    pub fn render(&self) -> GeoFrame {
        let state = self.shared.state.lock();
        if state.destroyed {
            return GeoFrame::default();
        }
        let config = &self.shared.config;
        let graph = &state.graph;
        let mut frame = GeoFrame { view: state.viewport, ..GeoFrame::default() };
        let mut seams = SeamSlots::new(config.seam_offset_step);
        let mut labels = LabelSlots::new();

        for node in graph.nodes().filter(|n| !state.hidden.contains_node(&n.id)) {
            let Some(position) = node_coordinates(node) else {
                frame.skipped_nodes += 1;
                continue;
            };
            frame.nodes.push(GeoNodePoint {
                id: node.id.clone(),
                position,
                color: attr_str(&node.attrs, "color")
                    .map(str::to_string)
                    .unwrap_or_else(|| string_to_color(&node.id)),
                radius: graph.node_diameter(node, config.node_diameter) / 2.0,
                label: node.label(),
                selected: state.selected.contains(&node.key()),
            });
        }

        for edge in graph.edges().filter(|e| !state.hidden.contains_edge(&e.id)) {
            let endpoints = (
                graph.node(&edge.source).and_then(node_coordinates),
                graph.node(&edge.target).and_then(node_coordinates),
            );
            let (Some(from), Some(to)) = endpoints else {
                continue;
            };
            let projection = project(from, to);
            if projection.is_empty() {
                continue;
            }
            let selected = state.selected.contains(&edge.key());
            let weight = match attr_number(&edge.attrs, "weight") {
                Some(w) if w > 6.0 => 20.0,
                Some(w) => w * w,
                None => 1.0,
            };
            let color = if selected {
                SELECTED_EDGE_COLOR.to_string()
            } else {
                attr_str(&edge.attrs, "color").unwrap_or(DEFAULT_EDGE_COLOR).to_string()
            };

            frame.markers.extend(projection.markers.iter().map(|m| seams.place(*m)));
            let directed = edge.is_directed();
            if directed {
                frame.markers.extend(arrowhead(
                    &projection.segments,
                    config.arrow_back_fraction,
                    &mut seams,
                ));
            }
            if let Some(text) = attr_str(&edge.attrs, "relationship") {
                if let Some(placement) = labels.place(from, to) {
                    frame.labels.push(GeoLabel {
                        edge_id: edge.id.clone(),
                        text: text.replace(['<', '>'], ""),
                        placement,
                    });
                }
            }
            frame.edges.push(GeoEdgeShape {
                id: edge.id.clone(),
                segments: projection.segments,
                color,
                weight,
                selected,
                directed,
            });
        }
        frame
    }
}

impl VisibilityTarget for GeoMapView {
    fn target_name(&self) -> String {
        "geo".to_string()
    }

    fn visibility_graph(&self) -> Option<AttributedGraph> {
        let state = self.shared.state.lock();
        (!state.destroyed).then(|| state.graph.clone())
    }

    fn apply_hidden(&self, hidden: &HiddenSet) {
        let mut state = self.shared.state.lock();
        if !state.destroyed {
            state.hidden = hidden.clone();
        }
    }

    fn recover(&self) {
        self.fit_bounds();
        tracing::debug!(zoom = self.viewport().zoom, "Geo view refitted after rejected update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarkerKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pacific() -> Vec<ElementSnapshot> {
        vec![
            ElementSnapshot::node("tokyo").with_attr("lat", 35.7).with_attr("lng", 139.7),
            ElementSnapshot::node("fiji").with_attr("lat", -17.7).with_attr("lng", 178.0),
            ElementSnapshot::node("samoa").with_attr("lat", -13.8).with_attr("lng", -172.1),
            ElementSnapshot::node("nowhere"),
            ElementSnapshot::edge_with_id("hop", "fiji", "samoa")
                .with_attr("enlightement", "arrow")
                .with_attr("relationship", "ferry"),
            ElementSnapshot::edge_with_id("flight", "tokyo", "fiji").with_attr("weight", 2),
            ElementSnapshot::edge_with_id("ghost", "tokyo", "nowhere"),
        ]
    }

    #[test]
    fn test_render_projects_and_skips_missing_coordinates() {
        let view = GeoMapView::new(&pacific(), None, ViewConfig::default());
        let frame = view.render();

        assert_eq!(frame.nodes.len(), 3);
        assert_eq!(frame.skipped_nodes, 1);
        assert_eq!(frame.edges.len(), 2);

        let hop = frame.edges.iter().find(|e| e.id == "hop").unwrap();
        assert_eq!(hop.segments.len(), 2);
        assert!(hop.directed);

        let flight = frame.edges.iter().find(|e| e.id == "flight").unwrap();
        assert_eq!(flight.weight, 4.0);
        assert_eq!(flight.color, DEFAULT_EDGE_COLOR);

        let chevrons = frame.markers.iter().filter(|m| m.kind == MarkerKind::Chevron).count();
        let arrows = frame.markers.iter().filter(|m| m.kind == MarkerKind::Arrowhead).count();
        assert_eq!((chevrons, arrows), (2, 1));
        assert_eq!(frame.labels.len(), 1);
        assert_eq!(frame.labels[0].text, "ferry");
    }

    #[test]
    fn test_hidden_elements_are_not_drawn() {
        let view = GeoMapView::new(&pacific(), None, ViewConfig::default());
        let mut hidden = HiddenSet::new();
        hidden.nodes.insert("tokyo".into());
        hidden.edges.insert("flight".into());
        view.apply_hidden(&hidden);

        let frame = view.render();
        assert!(frame.nodes.iter().all(|n| n.id != "tokyo"));
        assert!(frame.edges.iter().all(|e| e.id != "flight"));
    }

    #[test]
    fn test_click_joins_session_without_echo() {
        let manager = SelectionManager::new();
        let view = GeoMapView::new(&pacific(), Some(manager.clone()), ViewConfig::default());
        let events = Arc::new(AtomicUsize::new(0));
        let e = Arc::clone(&events);
        view.on(EventKind::Select, move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        assert!(view.click("hop"));
        assert_eq!(manager.keys(), vec![CanonicalKey::edge("hop")]);
        assert_eq!(events.load(Ordering::SeqCst), 1);
        assert!(view.render().edges.iter().any(|e| e.id == "hop" && e.color == "yellow"));

        // remote change
        manager.select(&ElementSnapshot::node("tokyo"));
        assert!(view.is_selected("tokyo"));
        assert_eq!(events.load(Ordering::SeqCst), 2);

        // click again unselects
        assert!(view.click("hop"));
        assert!(!manager.is_selected(&CanonicalKey::edge("hop")));
    }

    #[test]
    fn test_reflects_existing_selection_and_destroy() {
        let manager = SelectionManager::new();
        manager.select(&ElementSnapshot::node("fiji"));
        let view = GeoMapView::new(&pacific(), Some(manager.clone()), ViewConfig::default());
        assert_eq!(view.selected_keys(), vec![CanonicalKey::node("fiji")]);

        view.destroy();
        view.destroy();
        assert_eq!(manager.subscriber_count(), 0);
        assert!(!view.select("samoa"));
        assert_eq!(view.render(), GeoFrame::default());
        assert!(view.visibility_graph().is_none());
    }

    #[test]
    fn test_node_and_edge_sharing_an_id_select_independently() {
        let manager = SelectionManager::new();
        let view = GeoMapView::new(
            &[
                ElementSnapshot::node("a").with_attr("lat", 0.0).with_attr("lng", 0.0),
                ElementSnapshot::node("b").with_attr("lat", 10.0).with_attr("lng", 10.0),
                ElementSnapshot::node("x").with_attr("lat", 5.0).with_attr("lng", 0.0),
                ElementSnapshot::edge_with_id("x", "a", "b"),
            ],
            Some(manager.clone()),
            ViewConfig::default(),
        );

        assert!(view.select("x"));
        assert_eq!(view.selected_keys(), vec![CanonicalKey::node("x")]);
        let frame = view.render();
        assert!(frame.nodes.iter().any(|n| n.id == "x" && n.selected));
        assert!(frame.edges.iter().all(|e| !e.selected));

        // the edge arrives from the session under its own key
        manager.select(&ElementSnapshot::edge_with_id("x", "a", "b"));
        assert!(view.is_key_selected(&CanonicalKey::edge("x")));
        assert!(view.unselect("x"));
        assert_eq!(view.selected_keys(), vec![CanonicalKey::edge("x")]);
    }

    #[test]
    fn test_viewport_fits_nodes_and_recover_refits() {
        let view = GeoMapView::new(&pacific(), None, ViewConfig::default());
        let fitted = view.viewport();
        let (sw, ne) = fitted.bounds.unwrap();
        assert!(sw.lat < -17.7 && ne.lat > 35.7);
        assert!(sw.lng < -172.1 && ne.lng > 178.0);
        assert_eq!(view.render().view, fitted);

        view.set_view(LatLng::new(60.0, 10.0), 9.0);
        assert_eq!(view.viewport().center, LatLng::new(60.0, 10.0));

        // hide tokyo, then a rejected window resets the map to what is still visible
        let mut hidden = HiddenSet::new();
        hidden.nodes.insert("tokyo".into());
        view.apply_hidden(&hidden);
        view.recover();
        let refit = view.viewport();
        assert_ne!(refit, fitted);
        let (sw, ne) = refit.bounds.unwrap();
        assert!(ne.lat < 35.7 && sw.lat < -17.7);
        assert!(refit.zoom >= MIN_GEO_ZOOM);
    }

    #[test]
    fn test_viewport_without_coordinates_is_default() {
        let view = GeoMapView::new(&[ElementSnapshot::node("nowhere")], None, ViewConfig::default());
        assert_eq!(view.viewport(), GeoViewport::default());
        view.set_view(LatLng::new(f64::NAN, 0.0), 3.0);
        assert_eq!(view.viewport().center, DEFAULT_GEO_CENTER);
    }
}
