//! Session configuration
//!
//! Defaults cover a typical regional dataset; every knob can be overridden in
//! code or through environment variables (see [`PipelineConfig::from_env`]).

use crate::error::{PipelineError, PipelineResult};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default raster downsampling stride (keep every 10th row and column)
pub const DEFAULT_DOWNSAMPLE_STRIDE: usize = 10;

/// Default heatmap kernel radius, in renderer pixels
pub const DEFAULT_HEATMAP_RADIUS: f64 = 10.0;

/// Default upper bound on a single file read or HTTP fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable overriding [`PipelineConfig::downsample_stride`]
pub const ENV_DOWNSAMPLE_STRIDE: &str = "RAIN_GARDEN_DOWNSAMPLE_STRIDE";
/// Environment variable overriding [`PipelineConfig::heatmap_radius`]
pub const ENV_HEATMAP_RADIUS: &str = "RAIN_GARDEN_HEATMAP_RADIUS";
/// Environment variable overriding [`PipelineConfig::fetch_timeout`] (seconds)
pub const ENV_FETCH_TIMEOUT_SECS: &str = "RAIN_GARDEN_FETCH_TIMEOUT_SECS";
/// Environment variable overriding [`PipelineConfig::download_dir`]
pub const ENV_DOWNLOAD_DIR: &str = "RAIN_GARDEN_DOWNLOAD_DIR";

/// Tunables for a [`crate::RainGardenSession`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Stride used by `elevation(None)`
    pub downsample_stride: usize,
    /// Radius used by every heatmap the session builds
    pub heatmap_radius: f64,
    /// Bound on each source read; expiry surfaces as `DataUnavailable`
    pub fetch_timeout: Duration,
    /// Where remote sources are persisted before parsing
    pub download_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            downsample_stride: DEFAULT_DOWNSAMPLE_STRIDE,
            heatmap_radius: DEFAULT_HEATMAP_RADIUS,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            download_dir: env::temp_dir(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl PipelineConfig {
    /// Load configuration from the environment, falling back to defaults for
    /// variables that are unset or do not parse
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            downsample_stride: env_parse(ENV_DOWNSAMPLE_STRIDE)
                .unwrap_or(defaults.downsample_stride),
            heatmap_radius: env_parse(ENV_HEATMAP_RADIUS).unwrap_or(defaults.heatmap_radius),
            fetch_timeout: env_parse::<u64>(ENV_FETCH_TIMEOUT_SECS)
                .map_or(defaults.fetch_timeout, Duration::from_secs),
            download_dir: env::var_os(ENV_DOWNLOAD_DIR)
                .map_or(defaults.download_dir, PathBuf::from),
        }
    }

    /// Override the downsampling stride
    pub fn with_downsample_stride(mut self, stride: usize) -> Self {
        self.downsample_stride = stride;
        self
    }

    /// Override the heatmap radius
    pub fn with_heatmap_radius(mut self, radius: f64) -> Self {
        self.heatmap_radius = radius;
        self
    }

    /// Override the fetch timeout
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Override the download directory for remote sources
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Check every value against the preconditions of the operations that use it
    ///
    /// # Errors
    /// Returns `InvalidArgument` for a zero stride, a radius that is not finite
    /// and positive, or a zero timeout.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.downsample_stride < 1 {
            return Err(PipelineError::invalid_argument(
                "downsample_stride",
                format!("must be >= 1, got {}", self.downsample_stride),
            ));
        }
        if !(self.heatmap_radius.is_finite() && self.heatmap_radius > 0.0) {
            return Err(PipelineError::invalid_argument(
                "heatmap_radius",
                format!("must be finite and positive, got {}", self.heatmap_radius),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(PipelineError::invalid_argument(
                "fetch_timeout",
                "must be non-zero",
            ));
        }
        Ok(())
    }
}
