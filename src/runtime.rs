//! Render runtime boundary.
//!
//! A backend's renderer is loaded asynchronously through a [`RuntimeLoader`] and handed
//! back as a [`RenderSurface`] that accepts [`Frame`]s. The headless runtime records what
//! it was asked to draw, which is all the kernel needs to verify behavior without a GPU.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::adapter::BackendKind;
use crate::canonical::canonical_hash_hex;
use crate::types::Position;

/// Error type for runtime loading and presentation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime for a backend could not be loaded.
    #[error("{backend} runtime unavailable: {reason}")]
    Unavailable {
        /// Requested backend.
        backend: BackendKind,
        /// Loader-provided reason.
        reason: String,
    },

    /// The surface was detached.
    #[error("Render surface detached")]
    Detached,

    /// The surface rejected a frame.
    #[error("Present failed: {0}")]
    Present(String),
}

/// Host container the renderer draws into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    /// Host-side identifier.
    pub id: String,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl Container {
    /// Create a container.
    pub fn new(id: impl Into<String>, width: f64, height: f64) -> Self {
        Self { id: id.into(), width, height }
    }
}

/// A node as drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSprite {
    /// Node id.
    pub id: String,
    /// Layout position.
    pub position: Position,
    /// Diameter in the backend's units.
    pub size: f64,
    /// Fill color.
    pub color: String,
    /// Display label.
    pub label: String,
    /// Selected flag.
    pub selected: bool,
}

/// An edge as drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeStroke {
    /// Edge id.
    pub id: String,
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Stroke width.
    pub width: f64,
    /// Stroke color.
    pub color: String,
    /// Label text, if any.
    pub label: Option<String>,
    /// Perpendicular label offset among parallel edges.
    pub label_offset: f64,
    /// Curvature hint (0 = straight).
    pub curvature: f64,
    /// Whether an arrow is drawn at the target.
    pub directed: bool,
    /// Selected flag.
    pub selected: bool,
}

/// Camera state attached to a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Camera {
    /// Point at the center of the viewport.
    pub center: Position,
    /// Zoom level (1 = unscaled).
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self { center: Position::new(0.0, 0.0), zoom: 1.0 }
    }
}

/// One draw list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// Producing backend.
    pub backend: BackendKind,
    /// Monotonic per-mount sequence number.
    pub sequence: u64,
    /// Visible nodes.
    pub nodes: Vec<NodeSprite>,
    /// Visible edges.
    pub edges: Vec<EdgeStroke>,
    /// Camera.
    pub camera: Camera,
    /// Renderer-side layout currently running, if delegated.
    pub layout: Option<String>,
}

impl Frame {
    /// Content fingerprint, excluding the sequence number.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&(&self.backend, &self.nodes, &self.edges, &self.camera, &self.layout))
    }
}

/// 3D camera controls exposed by scene runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraControls {
    /// Current distance from the target.
    pub distance: f64,
    /// Closest allowed distance.
    pub min_distance: f64,
    /// Farthest allowed distance.
    pub max_distance: f64,
}

impl CameraControls {
    /// Clamp a distance into the allowed range.
    pub fn clamp(&self, distance: f64) -> f64 {
        distance.clamp(self.min_distance, self.max_distance)
    }
}

/// A loaded renderer bound to a container.
pub trait RenderSurface: Send {
    /// Draw a frame.
    fn present(&mut self, frame: &Frame) -> Result<(), RuntimeError>;

    /// Camera controls, for runtimes that have them.
    fn camera_controls(&self) -> Option<CameraControls> {
        None
    }

    /// Move the camera. Runtimes without controls ignore this.
    fn set_camera_distance(&mut self, _distance: f64) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Release the container. Idempotent.
    fn detach(&mut self);
}

/// Loads a backend's runtime.
#[async_trait]
pub trait RuntimeLoader: Send + Sync {
    /// Load the runtime for `kind` and bind it to `container`.
    async fn load(
        &self,
        kind: BackendKind,
        container: &Container,
    ) -> Result<Box<dyn RenderSurface>, RuntimeError>;
}

/// What a headless surface has seen.
#[derive(Debug, Clone, Default)]
pub struct SurfaceLog {
    /// Frames presented so far.
    pub presented: u64,
    /// Last frame presented.
    pub last_frame: Option<Frame>,
    /// Whether the surface was detached.
    pub detached: bool,
    /// Current camera, for scene runtimes.
    pub controls: Option<CameraControls>,
    /// Container the surface was bound to.
    pub container: Option<Container>,
}

/// A runtime that records frames instead of drawing them.
#[derive(Debug, Clone, Default)]
pub struct HeadlessRuntime {
    log: Arc<Mutex<SurfaceLog>>,
    controls: Option<CameraControls>,
}

impl HeadlessRuntime {
    /// Runtime without camera controls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runtime whose scene surfaces expose camera controls.
    pub fn with_camera(controls: CameraControls) -> Self {
        Self { log: Arc::default(), controls: Some(controls) }
    }

    /// Snapshot of what the surface has seen.
    pub fn log(&self) -> SurfaceLog {
        self.log.lock().clone()
    }
}

#[async_trait]
impl RuntimeLoader for HeadlessRuntime {
    async fn load(
        &self,
        kind: BackendKind,
        container: &Container,
    ) -> Result<Box<dyn RenderSurface>, RuntimeError> {
        {
            let mut log = self.log.lock();
            log.container = Some(container.clone());
            log.detached = false;
            log.controls = match kind {
                BackendKind::Scene => self.controls,
                _ => None,
            };
        }
        tracing::debug!(backend = %kind, container = %container.id, "Headless runtime loaded");
        Ok(Box::new(HeadlessSurface { log: Arc::clone(&self.log) }))
    }
}

struct HeadlessSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RenderSurface for HeadlessSurface {
    fn present(&mut self, frame: &Frame) -> Result<(), RuntimeError> {
        let mut log = self.log.lock();
        if log.detached {
            return Err(RuntimeError::Detached);
        }
        log.presented += 1;
        log.last_frame = Some(frame.clone());
        Ok(())
    }

    fn camera_controls(&self) -> Option<CameraControls> {
        self.log.lock().controls
    }

    fn set_camera_distance(&mut self, distance: f64) -> Result<(), RuntimeError> {
        let mut log = self.log.lock();
        if log.detached {
            return Err(RuntimeError::Detached);
        }
        if let Some(controls) = log.controls.as_mut() {
            controls.distance = controls.clamp(distance);
        }
        Ok(())
    }

    fn detach(&mut self) {
        self.log.lock().detached = true;
    }
}

/// A loader that always fails, e.g. when a renderer is not compiled in.
#[derive(Debug, Clone)]
pub struct UnavailableRuntime {
    reason: String,
}

impl UnavailableRuntime {
    /// Fail every load with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl RuntimeLoader for UnavailableRuntime {
    async fn load(
        &self,
        kind: BackendKind,
        _container: &Container,
    ) -> Result<Box<dyn RenderSurface>, RuntimeError> {
        Err(RuntimeError::Unavailable { backend: kind, reason: self.reason.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequence: u64) -> Frame {
        Frame {
            backend: BackendKind::Retained,
            sequence,
            nodes: vec![],
            edges: vec![],
            camera: Camera::default(),
            layout: None,
        }
    }

    #[tokio::test]
    async fn test_headless_records_frames_until_detached() {
        let runtime = HeadlessRuntime::new();
        let mut surface = runtime
            .load(BackendKind::Retained, &Container::new("main", 800.0, 600.0))
            .await
            .unwrap();

        surface.present(&frame(1)).unwrap();
        surface.present(&frame(2)).unwrap();
        assert_eq!(runtime.log().presented, 2);
        assert!(surface.camera_controls().is_none());

        surface.detach();
        assert_eq!(surface.present(&frame(3)), Err(RuntimeError::Detached));
        assert_eq!(runtime.log().last_frame.map(|f| f.sequence), Some(2));
    }

    #[tokio::test]
    async fn test_scene_surface_clamps_camera() {
        let runtime = HeadlessRuntime::with_camera(CameraControls {
            distance: 1000.0,
            min_distance: 100.0,
            max_distance: 5000.0,
        });
        let mut surface = runtime
            .load(BackendKind::Scene, &Container::new("main", 800.0, 600.0))
            .await
            .unwrap();
        surface.set_camera_distance(10.0).unwrap();
        assert_eq!(surface.camera_controls().unwrap().distance, 100.0);
    }

    #[tokio::test]
    async fn test_unavailable_runtime_fails() {
        let err = UnavailableRuntime::new("no webgl")
            .load(BackendKind::Gpu, &Container::new("main", 1.0, 1.0))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("no webgl"));
    }

    #[test]
    fn test_fingerprint_ignores_sequence() {
        assert_eq!(frame(1).fingerprint(), frame(9).fingerprint());
    }
}
