//! Heatmap aggregation of storm locations
//!
//! A [`HeatmapLayer`] is renderer-agnostic: a list of weighted points plus the
//! kernel radius the renderer should use. Coincident points are kept as
//! separate entries so repeated locations accumulate density.

use crate::error::{PipelineError, PipelineResult};
use crate::geo::{GeoBounds, LatLon};
use rustc_hash::FxHashMap;
use serde::Serialize;

/// A storm location with finite coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatPoint {
    lat: f64,
    lon: f64,
}

impl HeatPoint {
    /// Create a point; `None` unless both coordinates are finite
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        (lat.is_finite() && lon.is_finite()).then_some(Self { lat, lon })
    }

    /// Latitude in degrees
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees
    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl From<HeatPoint> for LatLon {
    fn from(p: HeatPoint) -> Self {
        LatLon {
            lat: p.lat,
            lon: p.lon,
        }
    }
}

/// A heat point with its weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightedPoint {
    /// Location
    pub point: HeatPoint,
    /// Contribution to density (1.0 for storm events)
    pub weight: f64,
}

/// Aggregated weight of one square lat/lon cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DensityCell {
    /// Center of the cell
    pub center: LatLon,
    /// Sum of the weights of the points inside
    pub weight: f64,
    /// Number of points inside
    pub count: usize,
}

/// Weighted points ready for a heatmap renderer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapLayer {
    points: Vec<WeightedPoint>,
    radius: f64,
}

fn check_positive(parameter: &'static str, value: f64) -> PipelineResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::invalid_argument(
            parameter,
            format!("must be finite and positive, got {value}"),
        ))
    }
}

impl HeatmapLayer {
    /// Weighted points in input order
    pub fn points(&self) -> &[WeightedPoint] {
        &self.points
    }

    /// Rendering kernel radius, as supplied
    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the layer has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of all weights
    pub fn total_weight(&self) -> f64 {
        self.points.iter().map(|p| p.weight).sum()
    }

    /// Bounding box of the points, `None` for an empty layer
    pub fn extent(&self) -> Option<GeoBounds> {
        GeoBounds::enclosing(self.points.iter().map(|p| LatLon::from(p.point)))
    }

    /// Bin points into square cells of `cell_deg` degrees
    ///
    /// Cells are aligned to multiples of `cell_deg` and returned sorted by
    /// descending weight, then by position.
    ///
    /// # Errors
    /// Returns `InvalidArgument` unless `cell_deg` is finite and positive.
    pub fn density(&self, cell_deg: f64) -> PipelineResult<Vec<DensityCell>> {
        check_positive("cell_deg", cell_deg)?;

        let mut bins: FxHashMap<(i64, i64), (f64, usize)> = FxHashMap::default();
        for p in &self.points {
            let key = (
                (p.point.lat / cell_deg).floor() as i64,
                (p.point.lon / cell_deg).floor() as i64,
            );
            let bin = bins.entry(key).or_insert((0.0, 0));
            bin.0 += p.weight;
            bin.1 += 1;
        }

        let mut cells: Vec<((i64, i64), DensityCell)> = bins
            .into_iter()
            .map(|((row, col), (weight, count))| {
                let center = LatLon {
                    lat: (row as f64 + 0.5) * cell_deg,
                    lon: (col as f64 + 0.5) * cell_deg,
                };
                ((row, col), DensityCell {
                    center,
                    weight,
                    count,
                })
            })
            .collect();
        cells.sort_by(|(ka, a), (kb, b)| b.weight.total_cmp(&a.weight).then(ka.cmp(kb)));

        Ok(cells.into_iter().map(|(_, cell)| cell).collect())
    }
}

/// Build a heatmap layer with unit weight per point
///
/// # Errors
/// Returns `InvalidArgument` unless `radius` is finite and positive.
pub fn build_heatmap(
    points: impl IntoIterator<Item = HeatPoint>,
    radius: f64,
) -> PipelineResult<HeatmapLayer> {
    check_positive("radius", radius)?;
    let points = points
        .into_iter()
        .map(|point| WeightedPoint { point, weight: 1.0 })
        .collect();
    Ok(HeatmapLayer { points, radius })
}
