//! Session orchestrator
//!
//! A [`RainGardenSession`] owns the three loaded sources for its lifetime and
//! answers every query the presentation layer needs. The loads are independent
//! and run concurrently; each one succeeds or fails on its own, so a broken
//! boundary file only disables the boundary view.

use crate::boundary::{load_boundaries, BoundaryFeatureSet};
use crate::catalog::{load_catalog, StormCatalog, StormEvent};
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::heatmap::{build_heatmap, HeatmapLayer};
use crate::raster::{load_elevation, DownsampledElevationGrid, ElevationGrid};
use crate::runoff::{estimate_runoff, RunoffEstimate, SoilProfile};
use crate::source::{DataSource, FetchOptions};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Locations of the three inputs of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSources {
    /// Polygon boundary layer (`GeoJSON`)
    pub boundary: DataSource,
    /// Elevation raster (`GeoTIFF`)
    pub elevation: DataSource,
    /// Storm table (CSV)
    pub storms: DataSource,
}

/// The three inputs, used to label status entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceKind {
    /// Boundary layer
    Boundary,
    /// Elevation raster
    Elevation,
    /// Storm table
    Storms,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceKind::Boundary => "boundary",
            SourceKind::Elevation => "elevation",
            SourceKind::Storms => "storm",
        })
    }
}

/// Load outcome of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SourceStatus {
    /// Loaded and cached
    Ready,
    /// Load failed; queries against this source return the error
    Failed {
        /// Error class
        kind: ErrorKind,
        /// Full error message
        message: String,
    },
}

/// Per-source status of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    /// Boundary layer status
    pub boundary: SourceStatus,
    /// Elevation raster status
    pub elevation: SourceStatus,
    /// Storm table status
    pub storms: SourceStatus,
}

impl SessionStatus {
    /// Status entries in display order
    pub fn entries(&self) -> [(SourceKind, &SourceStatus); 3] {
        [
            (SourceKind::Boundary, &self.boundary),
            (SourceKind::Elevation, &self.elevation),
            (SourceKind::Storms, &self.storms),
        ]
    }

    /// Whether every source loaded
    pub fn all_ready(&self) -> bool {
        self.entries()
            .iter()
            .all(|(_, status)| **status == SourceStatus::Ready)
    }
}

impl From<&PipelineError> for SourceStatus {
    fn from(e: &PipelineError) -> Self {
        SourceStatus::Failed {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

fn status_of<T>(outcome: &PipelineResult<T>) -> SourceStatus {
    outcome
        .as_ref()
        .err()
        .map_or(SourceStatus::Ready, SourceStatus::from)
}

/// Loaded inputs plus the configuration queries run with
///
/// Created by [`RainGardenSession::open`]; dropping it releases everything.
#[derive(Debug)]
pub struct RainGardenSession {
    config: PipelineConfig,
    boundaries: PipelineResult<BoundaryFeatureSet>,
    elevation: PipelineResult<ElevationGrid>,
    storms: PipelineResult<StormCatalog>,
}

impl RainGardenSession {
    /// Load all three sources concurrently and start a session
    ///
    /// Individual load failures do not fail the session; they are recorded
    /// and reported through [`RainGardenSession::status`].
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `config` fails validation.
    pub fn open(sources: &SessionSources, config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        let options = FetchOptions {
            timeout: config.fetch_timeout,
            download_dir: config.download_dir.clone(),
        };

        let (boundaries, (elevation, storms)) = rayon::join(
            || load_boundaries(&sources.boundary, &options),
            || {
                rayon::join(
                    || load_elevation(&sources.elevation, &options),
                    || load_catalog(&sources.storms, &options),
                )
            },
        );

        let session = Self::from_parts(config, boundaries, elevation, storms);
        for (kind, status) in session.status().entries() {
            if let SourceStatus::Failed { message, .. } = status {
                warn!(source = %kind, error = %message, "Source unavailable");
            }
        }
        info!(all_ready = session.status().all_ready(), "Session opened");
        Ok(session)
    }

    /// Assemble a session from already-loaded (or failed) inputs
    pub fn from_parts(
        config: PipelineConfig,
        boundaries: PipelineResult<BoundaryFeatureSet>,
        elevation: PipelineResult<ElevationGrid>,
        storms: PipelineResult<StormCatalog>,
    ) -> Self {
        Self {
            config,
            boundaries,
            elevation,
            storms,
        }
    }

    /// Configuration the session runs with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Per-source load status
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            boundary: status_of(&self.boundaries),
            elevation: status_of(&self.elevation),
            storms: status_of(&self.storms),
        }
    }

    /// The boundary layer
    ///
    /// # Errors
    /// Returns the boundary load error if that source failed.
    pub fn boundaries(&self) -> PipelineResult<&BoundaryFeatureSet> {
        self.boundaries.as_ref().map_err(Clone::clone)
    }

    /// The full-resolution elevation grid
    ///
    /// # Errors
    /// Returns the elevation load error if that source failed.
    pub fn elevation_grid(&self) -> PipelineResult<&ElevationGrid> {
        self.elevation.as_ref().map_err(Clone::clone)
    }

    /// The elevation grid downsampled by `stride`, or by the configured
    /// stride when `None`
    ///
    /// # Errors
    /// Returns the elevation load error if that source failed, or
    /// `InvalidArgument` for a zero stride.
    pub fn elevation(&self, stride: Option<usize>) -> PipelineResult<DownsampledElevationGrid> {
        self.elevation_grid()?
            .downsample(stride.unwrap_or(self.config.downsample_stride))
    }

    /// The storm catalog
    ///
    /// # Errors
    /// Returns the storm load error if that source failed.
    pub fn storms(&self) -> PipelineResult<&StormCatalog> {
        self.storms.as_ref().map_err(Clone::clone)
    }

    /// Distinct storm locations, sorted ignoring case
    ///
    /// # Errors
    /// Returns the storm load error if that source failed.
    pub fn storm_locations(&self) -> PipelineResult<&[String]> {
        Ok(self.storms()?.locations())
    }

    /// Storm events recorded at `location`, empty if there are none
    ///
    /// # Errors
    /// Returns the storm load error if that source failed.
    pub fn storm_events(&self, location: &str) -> PipelineResult<Vec<&StormEvent>> {
        Ok(self.storms()?.events_for(location))
    }

    /// The event of `location` labelled `label`
    ///
    /// # Errors
    /// Returns the storm load error if that source failed, or `NotFound` for
    /// a stale selection.
    pub fn storm_event(&self, location: &str, label: &str) -> PipelineResult<&StormEvent> {
        self.storms()?.event_by_label(location, label)
    }

    /// Heatmap of storm locations, optionally restricted to one location
    ///
    /// # Errors
    /// Returns the storm load error if that source failed.
    pub fn heatmap(&self, location_filter: Option<&str>) -> PipelineResult<HeatmapLayer> {
        let catalog = self.storms()?;
        let radius = self.config.heatmap_radius;
        match location_filter {
            Some(location) => build_heatmap(catalog.spatial_points_for(location), radius),
            None => build_heatmap(catalog.spatial_points(), radius),
        }
    }

    /// Runoff reduction for a garden; independent of the loaded sources
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `size_sqft` is outside [50, 500].
    #[expect(
        clippy::unused_self,
        reason = "Part of the session query surface alongside the source-backed queries"
    )]
    pub fn runoff(&self, size_sqft: f64, soil: SoilProfile) -> PipelineResult<RunoffEstimate> {
        estimate_runoff(size_sqft, soil)
    }
}
