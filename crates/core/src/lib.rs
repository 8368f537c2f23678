//! Rain Garden Planner Core Library
//!
//! Geospatial ingestion and simulation pipeline behind a stormwater decision
//! tool: loads municipal boundary polygons, an elevation raster and historical
//! storm records, normalizes them into analysis-ready structures, and computes
//! storm heatmaps and rain-garden runoff reduction on top of them.
//!
//! ## Pipeline
//!
//! - Boundary layers (`GeoJSON`) -> [`BoundaryFeatureSet`]
//! - Elevation rasters (`GeoTIFF`) -> [`ElevationGrid`] -> [`DownsampledElevationGrid`]
//! - Storm tables (CSV) -> [`StormCatalog`] -> [`HeatmapLayer`]
//! - Garden size and soil -> [`RunoffEstimate`]
//!
//! [`RainGardenSession`] loads the three sources concurrently and exposes the
//! query surface used by presentation code. Rendering, page layout and weather
//! lookups are left to the caller.

// Shared primitives
pub mod config;
pub mod error;
pub mod geo;
pub mod source;

// Loaders
pub mod boundary;
pub mod catalog;
pub mod raster;

// Derived products
pub mod heatmap;
pub mod runoff;

// Orchestration
pub mod pipeline;

// Re-export main types
pub use boundary::{load_boundaries, BoundaryFeature, BoundaryFeatureSet};
pub use catalog::{load_catalog, StormCatalog, StormEvent};
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use geo::{GeoBounds, LatLon};
pub use heatmap::{build_heatmap, HeatPoint, HeatmapLayer};
pub use pipeline::{RainGardenSession, SessionSources, SessionStatus, SourceKind, SourceStatus};
pub use raster::{downsample, load_elevation, DownsampledElevationGrid, ElevationGrid, ElevationStats};
pub use runoff::{estimate_runoff, RunoffEstimate, SoilProfile};
pub use source::{DataSource, FetchOptions};
