//! View configuration.
//!
//! Every tunable constant of the renderers lives in [`ViewConfig`]. Defaults match the
//! stock look; hosts may deserialize a config from JSON or overlay `TOPOVIEW_*`
//! environment variables with [`ViewConfig::from_env`].
//!
//! ## Environment
//!
//! - `TOPOVIEW_FRAME_INTERVAL_MS`: frame coalescing interval (default: 16)
//! - `TOPOVIEW_LAYOUT_ITERATIONS`: default force layout iterations (default: 200)
//! - `TOPOVIEW_WORKER_MIN_NODES`: node count from which layouts go to a worker (default: 1)
//! - `TOPOVIEW_NOTICE_TTL_MS`: lifetime of transient notices (default: 4000)
//! - `TOPOVIEW_LABEL_SPREAD`: half-range of parallel edge label offsets (default: 18)

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable did not parse.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: String,
        /// Raw value.
        value: String,
    },
    /// A range has `min >= max`.
    #[error("Invalid range for {field}: [{min}, {max}]")]
    InvalidRange {
        /// Config field.
        field: &'static str,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// A value that must be strictly positive was not.
    #[error("{field} must be positive")]
    NonPositive {
        /// Config field.
        field: &'static str,
    },
}

/// Output range for a linear scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleRange {
    /// Output for the smallest input.
    pub min: f64,
    /// Output for the largest input.
    pub max: f64,
}

impl ScaleRange {
    /// Create a new range.
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp a value into the range.
    pub fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.min, self.max)
    }

    fn check(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.min.is_finite() && self.max.is_finite() && self.min < self.max {
            Ok(())
        } else {
            Err(ConfigError::InvalidRange { field, min: self.min, max: self.max })
        }
    }
}

/// Container size assumed until the host reports one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self { width: 800.0, height: 600.0 }
    }
}

/// Tunables shared by adapters, the timeline filter and the geo view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Node diameter range that weights map onto.
    pub node_diameter: ScaleRange,
    /// Edge width range that weights map onto.
    pub edge_width: ScaleRange,
    /// Parallel edge labels spread over `[-label_spread, label_spread]`.
    pub label_spread: f64,
    /// Lateral latitude step between chevrons sharing a seam bucket.
    pub seam_offset_step: f64,
    /// Fraction of the last segment an arrowhead is stepped back.
    pub arrow_back_fraction: f64,
    /// Interval of the frame executor in milliseconds.
    pub frame_interval_ms: u64,
    /// Default force layout iterations.
    pub layout_iterations: usize,
    /// Node count from which the GPU backend runs force layouts on a worker.
    pub worker_min_nodes: usize,
    /// Lifetime of transient notices in milliseconds.
    pub notice_ttl_ms: u64,
    /// Padding kept around the graph by `fit()`.
    pub fit_padding: f64,
    /// Container size used before `resize()`.
    pub viewport: ViewportSize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            node_diameter: ScaleRange::new(12.0, 60.0),
            edge_width: ScaleRange::new(1.0, 6.0),
            label_spread: 18.0,
            seam_offset_step: 0.12,
            arrow_back_fraction: 0.02,
            frame_interval_ms: 16,
            layout_iterations: 200,
            worker_min_nodes: 1,
            notice_ttl_ms: 4000,
            fit_padding: 30.0,
            viewport: ViewportSize::default(),
        }
    }
}

impl ViewConfig {
    /// Defaults overlaid with `TOPOVIEW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = env_parse("TOPOVIEW_FRAME_INTERVAL_MS")? {
            config.frame_interval_ms = v;
        }
        if let Some(v) = env_parse("TOPOVIEW_LAYOUT_ITERATIONS")? {
            config.layout_iterations = v;
        }
        if let Some(v) = env_parse("TOPOVIEW_WORKER_MIN_NODES")? {
            config.worker_min_nodes = v;
        }
        if let Some(v) = env_parse("TOPOVIEW_NOTICE_TTL_MS")? {
            config.notice_ttl_ms = v;
        }
        if let Some(v) = env_parse("TOPOVIEW_LABEL_SPREAD")? {
            config.label_spread = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and positivity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.node_diameter.check("node_diameter")?;
        self.edge_width.check("edge_width")?;
        if !positive(self.label_spread) {
            return Err(ConfigError::NonPositive { field: "label_spread" });
        }
        if !positive(self.seam_offset_step) {
            return Err(ConfigError::NonPositive { field: "seam_offset_step" });
        }
        if !positive(self.arrow_back_fraction) || self.arrow_back_fraction >= 1.0 {
            return Err(ConfigError::InvalidRange {
                field: "arrow_back_fraction",
                min: 0.0,
                max: 1.0,
            });
        }
        if self.layout_iterations == 0 {
            return Err(ConfigError::NonPositive { field: "layout_iterations" });
        }
        Ok(())
    }

    /// Frame interval as a duration.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Notice lifetime as a duration.
    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }
}

fn positive(v: f64) -> bool {
    v.is_finite() && v > 0.0
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { name: name.to_string(), value: raw }),
        Err(_) => Ok(None),
    }
}
