//! Integration tests for multi-view synchronization.
//!
//! Several views are mounted over headless runtimes and driven through their handles,
//! the selection session and the timeline filter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use topoview_kernel::{
    BackendKind, CameraControls, CanonicalKey, Container, ElementClass, ElementSnapshot,
    FrameExecutor, GeoMapView, HeadlessRuntime, InlineExecutor, LayoutDescriptor, LayoutStatus,
    ManualExecutor, MountConfig, Mounter, Position, SelectionEvent, SelectionManager, TimeWindow,
    TimelineFilter, UnavailableRuntime, ViewConfig, VisibilityOutcome, VisibilityTarget,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn cities() -> Vec<ElementSnapshot> {
    vec![
        ElementSnapshot::node("lisbon")
            .with_attr("lat", 38.7)
            .with_attr("lng", -9.1)
            .with_attr("time", 1000)
            .with_attr("weight", 1)
            .at(0.0, 0.0),
        ElementSnapshot::node("porto")
            .with_attr("lat", 41.1)
            .with_attr("lng", -8.6)
            .with_attr("time", 2000)
            .with_attr("weight", 3)
            .at(100.0, 0.0),
        ElementSnapshot::node("faro")
            .with_attr("lat", 37.0)
            .with_attr("lng", -7.9)
            .with_attr("time", 3000)
            .with_attr("weight", 2)
            .with_attr("kind", "coast")
            .at(0.0, 100.0),
        ElementSnapshot::edge_with_id("rail", "lisbon", "porto").with_attr("relationship", "train"),
        ElementSnapshot::edge_with_id("road", "lisbon", "faro"),
        ElementSnapshot::edge("porto", "faro"),
    ]
}

fn config() -> MountConfig {
    MountConfig::new(Container::new("main", 800.0, 600.0), cities())
}

async fn mount(
    kind: BackendKind,
    runtime: &HeadlessRuntime,
    selection: &SelectionManager,
) -> topoview_kernel::Handle {
    Mounter::new(Arc::new(runtime.clone()))
        .with_selection(selection.clone())
        .mount(kind, config())
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection Sync
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_selection_reaches_every_view_once() {
    let manager = SelectionManager::new();
    let notifications = Arc::new(AtomicUsize::new(0));
    let n = Arc::clone(&notifications);
    let _counter = manager.on(SelectionEvent::Change, move |_| {
        n.fetch_add(1, Ordering::SeqCst);
    });

    let retained = mount(BackendKind::Retained, &HeadlessRuntime::new(), &manager).await;
    let gpu = mount(BackendKind::Gpu, &HeadlessRuntime::new(), &manager).await;
    let geo = GeoMapView::new(&cities(), Some(manager.clone()), ViewConfig::default());

    let events = Arc::new(AtomicUsize::new(0));
    for handle in [&retained, &gpu] {
        let e = Arc::clone(&events);
        handle.on("select", move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });
    }

    assert!(retained.select("porto"));
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert_eq!(events.load(Ordering::SeqCst), 2);
    assert!(gpu.get("porto").unwrap().has_class(ElementClass::Selected));
    assert!(geo.is_selected("porto"));

    // repeating the gesture changes nothing
    assert!(!retained.select("porto"));
    assert!(!gpu.select("porto"));
    assert_eq!(notifications.load(Ordering::SeqCst), 1);

    // the geo view is a full participant
    assert!(geo.click("rail"));
    assert!(retained.get("rail").unwrap().has_class(ElementClass::Selected));
    assert!(gpu.get("rail").unwrap().has_class(ElementClass::Selected));
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn test_replace_and_unselect_all_propagate() {
    let manager = SelectionManager::new();
    let a = mount(BackendKind::Retained, &HeadlessRuntime::new(), &manager).await;
    let b = mount(BackendKind::Scene, &HeadlessRuntime::new(), &manager).await;

    a.select("lisbon");
    a.select("faro");
    manager.set_selection(&[ElementSnapshot::node("porto")]);

    let selected: Vec<String> = b
        .filter(":selected")
        .iter()
        .map(|e| e.id().to_string())
        .collect();
    assert_eq!(selected, vec!["porto".to_string()]);

    assert_eq!(b.unselect_all(), 1);
    assert!(manager.is_empty());
    assert!(a.filter(":selected").is_empty());
}

#[tokio::test]
async fn test_late_mount_reflects_existing_selection() {
    let manager = SelectionManager::new();
    manager.select(&ElementSnapshot::node("faro"));
    manager.select(&ElementSnapshot::node("atlantis"));

    let handle = mount(BackendKind::Gpu, &HeadlessRuntime::new(), &manager).await;
    let selected: Vec<String> = handle
        .filter(":selected")
        .iter()
        .map(|e| e.id().to_string())
        .collect();
    assert_eq!(selected, vec!["faro".to_string()]);
    assert_eq!(manager.len(), 2);
}

#[tokio::test]
async fn test_element_ref_selected_routes_through_session() {
    let manager = SelectionManager::new();
    let a = mount(BackendKind::Retained, &HeadlessRuntime::new(), &manager).await;
    let b = mount(BackendKind::Gpu, &HeadlessRuntime::new(), &manager).await;

    assert!(a.get("road").unwrap().set("selected", true));
    assert!(manager.is_selected(&CanonicalKey::edge("road")));
    assert!(b.get("road").unwrap().has_class(ElementClass::Selected));

    // non-boolean values are rejected at the boundary
    assert!(!a.get("road").unwrap().set("selected", "yes"));
    assert_eq!(a.failure_count(), 1);
}

#[tokio::test]
async fn test_node_and_edge_sharing_an_id_keep_separate_state() {
    let manager = SelectionManager::new();
    let runtime = HeadlessRuntime::new();
    let elements = vec![
        ElementSnapshot::node("a").at(0.0, 0.0),
        ElementSnapshot::node("b").at(100.0, 0.0),
        ElementSnapshot::node("x").at(50.0, 50.0),
        ElementSnapshot::edge_with_id("x", "a", "b"),
    ];
    let handle = Mounter::new(Arc::new(runtime.clone()))
        .with_selection(manager.clone())
        .mount(BackendKind::Retained, MountConfig::new(Container::new("ids", 400.0, 300.0), elements))
        .await;
    let edge_x = handle.edges().into_iter().find(|e| e.id() == "x").unwrap();
    let node_x = handle.get("x").unwrap();
    assert!(node_x.is_node());

    assert!(handle.select("x"));
    assert!(node_x.has_class(ElementClass::Selected));
    assert!(!edge_x.has_class(ElementClass::Selected));
    assert_eq!(manager.keys(), vec![CanonicalKey::node("x")]);

    let frame = runtime.log().last_frame.unwrap();
    assert!(frame.nodes.iter().find(|n| n.id == "x").unwrap().selected);
    assert!(!frame.edges.iter().find(|e| e.id == "x").unwrap().selected);

    // the edge is addressable by key and selects on its own
    let by_key = handle.element(&CanonicalKey::edge("x")).unwrap();
    assert!(by_key.is_edge());
    assert!(by_key.select());
    assert_eq!(manager.len(), 2);
    assert!(node_x.unselect());
    assert!(edge_x.has_class(ElementClass::Selected));
    assert_eq!(manager.keys(), vec![CanonicalKey::edge("x")]);

    // hiding the edge leaves the node on screen
    assert!(edge_x.set("hidden", true));
    assert!(!node_x.has_class(ElementClass::Hidden));
    let frame = runtime.log().last_frame.unwrap();
    assert_eq!(frame.nodes.len(), 3);
    assert!(frame.edges.is_empty());
}

#[tokio::test]
async fn test_channel_listeners_see_view_gestures() {
    let manager = SelectionManager::new();
    let handle = mount(BackendKind::Gpu, &HeadlessRuntime::new(), &manager).await;
    let selects = Arc::new(AtomicUsize::new(0));
    let clears = Arc::new(AtomicUsize::new(0));
    let (s, c) = (Arc::clone(&selects), Arc::clone(&clears));
    let on_select = manager.on(SelectionEvent::Select, move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });
    let _on_clear = manager.on(SelectionEvent::Clear, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    handle.select("porto");
    manager.clear();
    assert!(manager.off(&on_select));
    handle.select("faro");

    assert_eq!(selects.load(Ordering::SeqCst), 1);
    assert_eq!(clears.load(Ordering::SeqCst), 1);
    assert!(handle.get("faro").unwrap().has_class(ElementClass::Selected));
    assert!(!handle.get("porto").unwrap().has_class(ElementClass::Selected));
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame Scheduling
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_deferred_executor_coalesces_frames() {
    let executor = Arc::new(ManualExecutor::new());
    let handle = Mounter::new(Arc::new(HeadlessRuntime::new()))
        .with_executor(executor.clone())
        .mount(BackendKind::Retained, config())
        .await;
    // mount draws its first frame directly
    assert_eq!(handle.stats().frames_drawn, 1);

    handle.select("lisbon");
    handle.select("porto");
    handle.get("faro").unwrap().set("weight", 9);
    handle.zoom(Some(2.0));
    assert_eq!(handle.stats().frames_drawn, 1);

    executor.run_pending();
    assert_eq!(handle.stats().frames_drawn, 2);
    assert_eq!(executor.queued(), 0);
}

#[tokio::test]
async fn test_frame_executor_draws_after_one_interval() {
    let frames = FrameExecutor::current(Duration::from_millis(1)).unwrap();
    let runtime = HeadlessRuntime::new();
    let handle = Mounter::new(Arc::new(runtime.clone()))
        .with_executor(Arc::new(frames))
        .mount(BackendKind::Gpu, config())
        .await;

    handle.select("lisbon");
    handle.select("porto");
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handle.stats().frames_drawn, 2);
    let frame = runtime.log().last_frame.unwrap();
    assert_eq!(frame.nodes.iter().filter(|n| n.selected).count(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Degradation & Teardown
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unavailable_runtime_degrades_to_noop() {
    let handle = Mounter::new(Arc::new(UnavailableRuntime::new("no webgl context")))
        .mount(BackendKind::Gpu, config())
        .await;

    assert_eq!(handle.kind(), None);
    assert!(handle.nodes().is_empty());
    assert!(handle.get("lisbon").is_none());
    assert!(!handle.select("lisbon"));
    assert_eq!(handle.layout(LayoutDescriptor::new("cose")).run(), LayoutStatus::Skipped);
    assert_eq!(handle.zoom(Some(3.0)), 1.0);
    handle.fit();
    handle.destroy();
    assert_eq!(handle.failure_count(), 0);
}

#[tokio::test]
async fn test_destroyed_handle_is_safe() {
    let manager = SelectionManager::new();
    let runtime = HeadlessRuntime::new();
    let handle = mount(BackendKind::Retained, &runtime, &manager).await;
    assert_eq!(manager.subscriber_count(), 1);

    handle.destroy();
    handle.destroy();

    assert!(!handle.is_live());
    assert!(runtime.log().detached);
    assert_eq!(manager.subscriber_count(), 0);
    assert!(!handle.select("lisbon"));
    assert!(handle.nodes().is_empty());
    handle.fit();
    handle.resize(10.0, 10.0);
    assert_eq!(handle.layout(LayoutDescriptor::preset()).run(), LayoutStatus::Skipped);
    assert!(handle.failure_count() >= 5);

    // remote changes no longer reach it
    manager.select(&ElementSnapshot::node("porto"));
    assert!(handle.stats().destroyed);
    assert_eq!(handle.stats().selected, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Elements, Layouts, Cameras
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_weight_change_rescales_sizes() {
    let runtime = HeadlessRuntime::new();
    let handle = mount(BackendKind::Retained, &runtime, &SelectionManager::new()).await;
    let size_of = |id: &str| {
        let frame = runtime.log().last_frame.unwrap();
        frame.nodes.iter().find(|n| n.id == id).unwrap().size
    };
    assert_eq!(size_of("porto"), 60.0);
    assert_eq!(size_of("faro"), 36.0);

    assert!(handle.get("lisbon").unwrap().set("weight", 5));
    // weights are now 5, 3, 2
    assert_eq!(size_of("lisbon"), 60.0);
    assert_eq!(size_of("porto"), 28.0);
    assert_eq!(size_of("faro"), 12.0);
}

#[tokio::test]
async fn test_remove_node_drops_incident_edges() {
    let handle = mount(BackendKind::Gpu, &HeadlessRuntime::new(), &SelectionManager::new()).await;
    let removed = handle.remove(&[ElementSnapshot::node("lisbon")]);
    assert_eq!(removed.len(), 3);
    let edges: Vec<String> = handle.edges().iter().map(|e| e.id().to_string()).collect();
    assert_eq!(edges, vec!["porto|faro".to_string()]);

    let report = handle.add(&[
        ElementSnapshot::node("braga").with_attr("weight", 1),
        ElementSnapshot::edge("braga", "porto"),
        ElementSnapshot::edge("braga", "nowhere"),
    ]);
    assert_eq!((report.nodes, report.edges, report.dropped_edges), (1, 1, 1));
    assert_eq!(handle.stats().edges, 2);
}

#[tokio::test]
async fn test_selector_vocabulary() {
    let handle =
        mount(BackendKind::Retained, &HeadlessRuntime::new(), &SelectionManager::new()).await;
    assert_eq!(handle.filter("node").len(), 3);
    assert_eq!(handle.filter("edge").len(), 3);
    assert_eq!(handle.filter("node[kind='coast']")[0].id(), "faro");
    assert_eq!(handle.filter("[relationship = \"train\"]")[0].id(), "rail");

    handle.get("road").unwrap().set("hidden", true);
    assert_eq!(handle.filter(".hidden").len(), 1);

    assert!(handle.filter("node >> edge").is_empty());
    assert_eq!(handle.failure_count(), 1);
}

#[tokio::test]
async fn test_gpu_force_layout_runs_on_worker() {
    let runtime = HeadlessRuntime::new();
    let handle = mount(BackendKind::Gpu, &runtime, &SelectionManager::new()).await;
    let (tx, rx) = tokio::sync::oneshot::channel();

    let status = handle
        .layout(LayoutDescriptor::new("cose").with_param("iterations", 20))
        .on_stop(move || {
            let _ = tx.send(());
        })
        .run();
    assert_eq!(status, LayoutStatus::Running);

    tokio::time::timeout(Duration::from_secs(5), rx).await.unwrap().unwrap();
    let frame = runtime.log().last_frame.unwrap();
    assert_eq!(frame.nodes.len(), 3);
    assert!(frame.nodes.iter().all(|n| n.position.is_finite()));
}

#[tokio::test]
async fn test_scene_camera_zoom_clamps() {
    let runtime = HeadlessRuntime::with_camera(CameraControls {
        distance: 1000.0,
        min_distance: 100.0,
        max_distance: 4000.0,
    });
    let handle = mount(BackendKind::Scene, &runtime, &SelectionManager::new()).await;

    assert_eq!(handle.zoom(None), 1.0);
    assert_eq!(handle.zoom(Some(2.0)), 2.0);
    assert_eq!(handle.camera_controls().unwrap().distance, 500.0);
    assert_eq!(handle.zoom(Some(100.0)), 10.0);
    assert_eq!(handle.zoom(Some(f64::NAN)), 10.0);
    assert_eq!(handle.zoom(Some(-2.0)), 10.0);

    assert_eq!(
        handle.layout(LayoutDescriptor::new("breadthfirst")).run(),
        LayoutStatus::Delegated
    );
    assert_eq!(runtime.log().last_frame.unwrap().layout.as_deref(), Some("treeTd2d"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Timeline
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_timeline_hides_and_rejects_empty_windows() {
    let manager = SelectionManager::new();
    let runtime = HeadlessRuntime::new();
    let handle = mount(BackendKind::Retained, &runtime, &manager).await;
    let geo = GeoMapView::new(&cities(), Some(manager), ViewConfig::default());

    let filter = TimelineFilter::new(Arc::new(InlineExecutor), ViewConfig::default());
    filter.attach(Arc::new(handle.clone()));
    filter.attach(Arc::new(geo.clone()));
    let notices = Arc::new(AtomicUsize::new(0));
    let n = Arc::clone(&notices);
    filter.on_notice(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
    });

    let outcomes = filter.apply_now(Some(TimeWindow::new(1000, 2000)));
    assert!(outcomes.iter().all(|o| matches!(o, VisibilityOutcome::Applied { .. })));
    assert!(handle.get("faro").unwrap().has_class(ElementClass::Hidden));
    assert!(handle.get("road").unwrap().has_class(ElementClass::Hidden));
    assert!(!handle.get("rail").unwrap().has_class(ElementClass::Hidden));
    assert!(geo.render().nodes.iter().all(|n| n.id != "faro"));
    let camera_before = runtime.log().last_frame.unwrap().camera;
    assert_eq!(camera_before.center, Position::new(400.0, 300.0));
    let geo_before = geo.viewport();

    let outcomes = filter.apply_now(Some(TimeWindow::new(5000, 6000)));
    assert!(outcomes.iter().all(|o| matches!(o, VisibilityOutcome::Rejected { .. })));
    assert_eq!(notices.load(Ordering::SeqCst), 1);
    // the previous hidden set survives the rejected update
    assert!(handle.get("faro").unwrap().has_class(ElementClass::Hidden));
    assert!(!handle.get("lisbon").unwrap().has_class(ElementClass::Hidden));

    // recovery fitted both views to what is still visible: lisbon and porto
    let camera_after = runtime.log().last_frame.unwrap().camera;
    assert_eq!(camera_after.center, Position::new(50.0, 0.0));
    assert_ne!(camera_after.zoom, camera_before.zoom);
    let geo_after = geo.viewport();
    assert_ne!(geo_after, geo_before);
    let (south_west, _) = geo_after.bounds.unwrap();
    assert!(south_west.lat > 37.0, "faro is hidden and left out of the fit");

    filter.apply_now(None);
    assert!(handle.filter(".hidden").is_empty());
    assert_eq!(handle.target_name(), "retained");
}

#[tokio::test]
async fn test_window_with_manual_hides_never_blanks_the_view() {
    let runtime = HeadlessRuntime::new();
    let handle = mount(BackendKind::Retained, &runtime, &SelectionManager::new()).await;
    let filter = TimelineFilter::new(Arc::new(InlineExecutor), ViewConfig::default());
    filter.attach(Arc::new(handle.clone()));
    let notices = Arc::new(AtomicUsize::new(0));
    let n = Arc::clone(&notices);
    filter.on_notice(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
    });

    assert!(handle.get("lisbon").unwrap().set("hidden", true));
    assert_eq!(handle.manual_hidden().len(), 1);

    // only lisbon is inside the window, and the user already hid it
    let outcomes = filter.apply_now(Some(TimeWindow::new(0, 1500)));
    assert!(matches!(outcomes[0], VisibilityOutcome::Rejected { .. }));
    assert_eq!(notices.load(Ordering::SeqCst), 1);

    let frame = runtime.log().last_frame.unwrap();
    let drawn: Vec<&str> = frame.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(drawn, vec!["faro", "porto"]);
    // recovery fitted the camera to porto and faro
    assert_eq!(frame.camera.center, Position::new(50.0, 50.0));
    assert!(!handle.get("porto").unwrap().has_class(ElementClass::Hidden));
}

#[tokio::test]
async fn test_window_and_manual_hides_combine() {
    let runtime = HeadlessRuntime::new();
    let handle = mount(BackendKind::Gpu, &runtime, &SelectionManager::new()).await;
    let filter = TimelineFilter::new(Arc::new(InlineExecutor), ViewConfig::default());
    filter.attach(Arc::new(handle.clone()));

    handle.get("porto").unwrap().set("hidden", true);
    let outcomes = filter.apply_now(Some(TimeWindow::new(1500, 3500)));
    assert_eq!(
        outcomes,
        vec![VisibilityOutcome::Applied {
            target: "gpu".to_string(),
            hidden_nodes: 1,
            hidden_edges: 2,
        }]
    );
    // lisbon is outside the window, porto hidden by hand: only faro is drawn
    let frame = runtime.log().last_frame.unwrap();
    assert_eq!(frame.nodes.len(), 1);
    assert_eq!(frame.nodes[0].id, "faro");
    assert!(frame.edges.is_empty());

    // showing porto again does not override the window for lisbon
    handle.get("porto").unwrap().set("hidden", false);
    assert!(handle.get("lisbon").unwrap().has_class(ElementClass::Hidden));
    assert_eq!(runtime.log().last_frame.unwrap().nodes.len(), 2);

    filter.apply_now(None);
    assert!(handle.filter(".hidden").is_empty());
    assert_eq!(runtime.log().last_frame.unwrap().nodes.len(), 3);
}

#[tokio::test]
async fn test_timeline_window_changes_coalesce() {
    let handle =
        mount(BackendKind::Scene, &HeadlessRuntime::new(), &SelectionManager::new()).await;
    let executor = Arc::new(ManualExecutor::new());
    let filter = TimelineFilter::new(executor.clone(), ViewConfig::default());
    filter.attach(Arc::new(handle.clone()));

    for max in [1500, 2500, 3500] {
        filter.set_window(Some(TimeWindow::new(0, max)));
    }
    executor.run_pending();
    assert_eq!(filter.recomputations(), 1);
    assert!(handle.filter(".hidden").is_empty());
}
