//! Elevation rasters: `GeoTIFF` loading, nodata masking and stride downsampling
//!
//! Samples are held row-major (`[row * cols + col]`) as `f64` regardless of the
//! on-disk sample type. A cell equal to the declared nodata sentinel (or NaN)
//! is unknown: it is kept verbatim in storage, but every numeric accessor
//! presents it as NaN or skips it. For `f32` bands the sentinel is rounded to
//! `f32` first, so a tag such as `-9999.9` still matches the stored samples.
//!
//! # Downsampling convention
//! Stride `k` keeps rows and columns `0, k, 2k, ...`, so the output has
//! `ceil(rows / k) x ceil(cols / k)` cells. No averaging is performed.

use crate::error::{PipelineError, PipelineResult};
use crate::geo::{GeoBounds, LatLon};
use crate::source::{fetch_bytes, DataSource, FetchOptions};
use serde::Serialize;
use std::io::Cursor;
use std::ops::Deref;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::{ColorType, TiffError, TiffFormatError};
use tracing::{debug, info};

/// `GeoTIFF` `ModelPixelScaleTag`
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
/// `GeoTIFF` `ModelTiepointTag`
const TAG_MODEL_TIEPOINT: u16 = 33922;
/// `GeoTIFF` `ModelTransformationTag`
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
/// GDAL private tag holding the nodata value as ASCII
const TAG_GDAL_NODATA: u16 = 42113;

/// Summary statistics over the valid (non-nodata) cells of a grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ElevationStats {
    /// Lowest valid sample
    pub min: f64,
    /// Highest valid sample
    pub max: f64,
    /// Mean of valid samples
    pub mean: f64,
    /// Number of cells that contributed
    pub valid_cells: usize,
    /// Number of cells skipped as nodata
    pub nodata_cells: usize,
}

/// A single-band elevation raster with its geographic bounds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElevationGrid {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    bounds: GeoBounds,
    nodata: Option<f64>,
}

impl ElevationGrid {
    /// Build a grid from row-major samples
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if either dimension is zero or `values` does not
    /// hold exactly `rows * cols` samples.
    pub fn new(
        rows: usize,
        cols: usize,
        values: Vec<f64>,
        bounds: GeoBounds,
        nodata: Option<f64>,
    ) -> PipelineResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(PipelineError::ShapeMismatch {
                rows,
                cols,
                reason: "raster must have at least one row and one column".to_string(),
            });
        }
        if values.len() != rows * cols {
            return Err(PipelineError::ShapeMismatch {
                rows,
                cols,
                reason: format!("expected {} samples, got {}", rows * cols, values.len()),
            });
        }

        Ok(Self {
            rows,
            cols,
            values,
            bounds,
            nodata,
        })
    }

    /// Number of rows (north to south)
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (west to east)
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Geographic extent of the raster
    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    /// Declared nodata sentinel at band precision, if any
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Samples exactly as stored, sentinels included
    pub fn raw_values(&self) -> &[f64] {
        &self.values
    }

    /// Whether a sample is the nodata sentinel or NaN
    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        value.is_nan() || self.nodata.is_some_and(|sentinel| value == sentinel)
    }

    /// Valid sample at (row, col); `None` when out of range or nodata
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let value = self.values[row * self.cols + col];
        (!self.is_nodata(value)).then_some(value)
    }

    /// Samples with every nodata cell replaced by NaN, ready for display
    pub fn masked_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .map(|&v| if self.is_nodata(v) { f64::NAN } else { v })
            .collect()
    }

    /// Min/max/mean over valid cells, `None` if every cell is nodata
    pub fn statistics(&self) -> Option<ElevationStats> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut valid_cells = 0usize;

        for &v in self.values.iter().filter(|&&v| !self.is_nodata(v)) {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            valid_cells += 1;
        }

        (valid_cells > 0).then(|| ElevationStats {
            min,
            max,
            mean: sum / valid_cells as f64,
            valid_cells,
            nodata_cells: self.values.len() - valid_cells,
        })
    }

    /// Geographic center of the cell at (row, col)
    pub fn cell_center(&self, row: usize, col: usize) -> LatLon {
        let lat_step = (self.bounds.max_lat - self.bounds.min_lat) / self.rows as f64;
        let lon_step = (self.bounds.max_lon - self.bounds.min_lon) / self.cols as f64;
        LatLon {
            lat: self.bounds.max_lat - (row as f64 + 0.5) * lat_step,
            lon: self.bounds.min_lon + (col as f64 + 0.5) * lon_step,
        }
    }

    fn subsample(&self, stride: usize) -> Self {
        let rows = self.rows.div_ceil(stride);
        let cols = self.cols.div_ceil(stride);
        let mut values = Vec::with_capacity(rows * cols);
        for r in (0..self.rows).step_by(stride) {
            let row = &self.values[r * self.cols..(r + 1) * self.cols];
            values.extend(row.iter().step_by(stride).copied());
        }

        Self {
            rows,
            cols,
            values,
            bounds: self.bounds,
            nodata: self.nodata,
        }
    }

    /// Keep every `stride`-th row and column
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `stride` is zero.
    pub fn downsample(&self, stride: usize) -> PipelineResult<DownsampledElevationGrid> {
        check_stride(stride)?;
        let grid = self.subsample(stride);
        debug!(
            stride,
            from_rows = self.rows,
            from_cols = self.cols,
            rows = grid.rows,
            cols = grid.cols,
            "Downsampled elevation grid"
        );
        Ok(DownsampledElevationGrid { grid, stride })
    }
}

fn check_stride(stride: usize) -> PipelineResult<()> {
    if stride < 1 {
        return Err(PipelineError::invalid_argument(
            "stride",
            format!("must be >= 1, got {stride}"),
        ));
    }
    Ok(())
}

/// A grid produced by [`ElevationGrid::downsample`]
///
/// Dereferences to [`ElevationGrid`] for all read access; bounds and nodata
/// semantics are those of the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownsampledElevationGrid {
    grid: ElevationGrid,
    stride: usize,
}

impl DownsampledElevationGrid {
    /// Stride relative to the original full-resolution grid
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Downsample further; the resulting stride is the product of both
    ///
    /// # Errors
    /// Returns `InvalidArgument` if `stride` is zero.
    pub fn downsample(&self, stride: usize) -> PipelineResult<DownsampledElevationGrid> {
        check_stride(stride)?;
        Ok(DownsampledElevationGrid {
            grid: self.grid.subsample(stride),
            stride: self.stride * stride,
        })
    }

    /// Drop the stride bookkeeping
    pub fn into_grid(self) -> ElevationGrid {
        self.grid
    }
}

impl Deref for DownsampledElevationGrid {
    type Target = ElevationGrid;

    fn deref(&self) -> &ElevationGrid {
        &self.grid
    }
}

/// Free-function form of [`ElevationGrid::downsample`]
///
/// # Errors
/// Returns `InvalidArgument` if `stride` is zero.
pub fn downsample(grid: &ElevationGrid, stride: usize) -> PipelineResult<DownsampledElevationGrid> {
    grid.downsample(stride)
}

/// Map a decoder error, keeping zero-sized rasters apart from unreadable ones
fn decode_error(origin: &str, context: &str, e: TiffError) -> PipelineError {
    match e {
        TiffError::FormatError(TiffFormatError::InvalidDimensions(width, height)) => {
            PipelineError::ShapeMismatch {
                rows: height as usize,
                cols: width as usize,
                reason: "raster reports zero-sized dimensions".to_string(),
            }
        }
        other => PipelineError::unavailable(origin, format!("{context}: {other}")),
    }
}

fn samples_to_f64(result: DecodingResult) -> Option<Vec<f64>> {
    #[allow(unreachable_patterns)]
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
        DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return None,
    };
    Some(values)
}

/// Derive geographic bounds from the pixel-scale/tiepoint pair or, failing
/// that, from an axis-aligned model transformation
fn georeference(
    scale: Option<Vec<f64>>,
    tiepoint: Option<Vec<f64>>,
    transform: Option<Vec<f64>>,
    rows: usize,
    cols: usize,
) -> Result<GeoBounds, String> {
    // (origin_lon, origin_lat, lon step per column, lat step per row)
    let (origin_lon, origin_lat, lon_step, lat_step) = match (scale, tiepoint, transform) {
        (Some(scale), Some(tie), _) if scale.len() >= 2 && tie.len() >= 6 => (
            tie[3] - tie[0] * scale[0],
            tie[4] + tie[1] * scale[1],
            scale[0],
            scale[1],
        ),
        (_, _, Some(m)) if m.len() >= 16 => {
            if m[1] != 0.0 || m[4] != 0.0 {
                return Err("rotated model transformations are not supported".to_string());
            }
            (m[3], m[7], m[0], -m[5])
        }
        _ => return Err("missing georeferencing tags".to_string()),
    };

    if !(lon_step.is_finite() && lat_step.is_finite() && lon_step > 0.0 && lat_step > 0.0) {
        return Err(format!("invalid pixel scale ({lon_step}, {lat_step})"));
    }

    Ok(GeoBounds {
        min_lat: origin_lat - rows as f64 * lat_step,
        max_lat: origin_lat,
        min_lon: origin_lon,
        max_lon: origin_lon + cols as f64 * lon_step,
    })
}

/// Decode a single-band `GeoTIFF` held in memory
///
/// # Errors
/// Returns `ShapeMismatch` for zero-sized rasters and `DataUnavailable` for
/// undecodable, multi-band or non-georeferenced input.
pub fn parse_elevation(origin: &str, bytes: Vec<u8>) -> PipelineResult<ElevationGrid> {
    let unavailable = |reason: String| PipelineError::unavailable(origin, reason);

    let mut decoder =
        Decoder::new(Cursor::new(bytes)).map_err(|e| decode_error(origin, "invalid TIFF", e))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| decode_error(origin, "cannot read dimensions", e))?;
    let (rows, cols) = (height as usize, width as usize);
    if rows == 0 || cols == 0 {
        return Err(PipelineError::ShapeMismatch {
            rows,
            cols,
            reason: "raster reports zero-sized dimensions".to_string(),
        });
    }

    match decoder
        .colortype()
        .map_err(|e| unavailable(format!("cannot read color type: {e}")))?
    {
        ColorType::Gray(_) => {}
        other => return Err(unavailable(format!("expected a single band, found {other:?}"))),
    }

    let mut f64_tag = |code: u16| -> PipelineResult<Option<Vec<f64>>> {
        decoder
            .find_tag(Tag::from_u16_exhaustive(code))
            .and_then(|value| value.map(tiff::decoder::ifd::Value::into_f64_vec).transpose())
            .map_err(|e| unavailable(format!("cannot read tag {code}: {e}")))
    };
    let scale = f64_tag(TAG_MODEL_PIXEL_SCALE)?;
    let tiepoint = f64_tag(TAG_MODEL_TIEPOINT)?;
    let transform = f64_tag(TAG_MODEL_TRANSFORMATION)?;
    let bounds = georeference(scale, tiepoint, transform, rows, cols).map_err(unavailable)?;

    let nodata = decoder
        .find_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
        .and_then(|value| value.map(tiff::decoder::ifd::Value::into_string).transpose())
        .map_err(|e| unavailable(format!("cannot read nodata tag: {e}")))?
        .map(|text| {
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            text.parse::<f64>()
                .map_err(|_| unavailable(format!("unparseable nodata value '{text}'")))
        })
        .transpose()?;

    let samples = decoder
        .read_image()
        .map_err(|e| decode_error(origin, "cannot decode samples", e))?;
    // Samples compare against the sentinel at band precision
    let nodata = match samples {
        DecodingResult::F32(_) => nodata.map(|sentinel| f64::from(sentinel as f32)),
        _ => nodata,
    };
    let values = samples_to_f64(samples)
        .ok_or_else(|| unavailable("unsupported sample format".to_string()))?;
    if values.len() != rows * cols {
        // Multiple samples per pixel or a truncated strip
        return Err(unavailable(format!(
            "expected {} samples for a {rows}x{cols} band, decoded {}",
            rows * cols,
            values.len()
        )));
    }

    ElevationGrid::new(rows, cols, values, bounds, nodata)
}

/// Fetch and decode an elevation raster
///
/// # Errors
/// Returns `DataUnavailable` if the source cannot be fetched or decoded and
/// `ShapeMismatch` if it reports zero rows or columns.
pub fn load_elevation(source: &DataSource, options: &FetchOptions) -> PipelineResult<ElevationGrid> {
    let origin = source.origin();
    let bytes = fetch_bytes(source, options)?;
    let grid = parse_elevation(&origin, bytes)?;
    info!(
        source = %origin,
        rows = grid.rows(),
        cols = grid.cols(),
        nodata = ?grid.nodata(),
        "Loaded elevation raster"
    );
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const NODATA: f64 = -9999.0;

    fn bounds() -> GeoBounds {
        GeoBounds {
            min_lat: 36.0,
            max_lat: 37.0,
            min_lon: -77.0,
            max_lon: -76.0,
        }
    }

    /// Grid whose cell value encodes its position: row * 100 + col
    fn indexed_grid(rows: usize, cols: usize) -> ElevationGrid {
        let values = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r * 100 + c) as f64))
            .collect();
        ElevationGrid::new(rows, cols, values, bounds(), Some(NODATA)).unwrap()
    }

    #[test]
    fn test_zero_rows_is_shape_mismatch() {
        let err = ElevationGrid::new(0, 5, Vec::new(), bounds(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn test_sample_count_mismatch() {
        let err = ElevationGrid::new(2, 2, vec![1.0; 3], bounds(), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn test_stride_one_is_identity() {
        let grid = indexed_grid(7, 5);
        let down = grid.downsample(1).unwrap();
        assert_eq!(*down, grid);
        assert_eq!(down.stride(), 1);
    }

    #[test]
    fn test_stride_zero_rejected() {
        let grid = indexed_grid(3, 3);
        let err = grid.downsample(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_dimensions_round_up() {
        let grid = indexed_grid(10, 7);
        let down = grid.downsample(3).unwrap();
        assert_eq!(down.rows(), 4);
        assert_eq!(down.cols(), 3);

        // Picks rows/cols 0, 3, 6, 9 and 0, 3, 6
        assert_eq!(down.get(0, 0), Some(0.0));
        assert_eq!(down.get(1, 2), Some(306.0));
        assert_eq!(down.get(3, 1), Some(903.0));
        assert_eq!(down.bounds(), grid.bounds());
    }

    #[test]
    fn test_stride_larger_than_grid_keeps_origin() {
        let grid = indexed_grid(3, 4);
        let down = grid.downsample(50).unwrap();
        assert_eq!((down.rows(), down.cols()), (1, 1));
        assert_eq!(down.get(0, 0), Some(0.0));
    }

    #[test]
    fn test_nodata_excluded_from_statistics() {
        let values = vec![10.0, NODATA, 20.0, 30.0, NODATA, f64::NAN];
        let grid = ElevationGrid::new(2, 3, values, bounds(), Some(NODATA)).unwrap();

        let stats = grid.statistics().unwrap();
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(stats.mean, 20.0);
        assert_eq!(stats.valid_cells, 3);
        assert_eq!(stats.nodata_cells, 3);

        assert_eq!(grid.get(0, 1), None);
        let masked = grid.masked_values();
        assert!(masked[1].is_nan());
        assert_eq!(masked[0], 10.0);
    }

    #[test]
    fn test_sentinel_propagates_through_downsample() {
        let values = vec![NODATA, 1.0, 2.0, 3.0];
        let grid = ElevationGrid::new(2, 2, values, bounds(), Some(NODATA)).unwrap();
        let down = grid.downsample(2).unwrap();

        assert_eq!(down.raw_values(), &[NODATA]);
        assert_eq!(down.nodata(), Some(NODATA));
        assert!(down.statistics().is_none());
        assert!(down.masked_values()[0].is_nan());
    }

    #[test]
    fn test_cell_center() {
        let grid = indexed_grid(10, 10);
        let center = grid.cell_center(0, 0);
        assert!((center.lat - 36.95).abs() < 1e-9);
        assert!((center.lon + 76.95).abs() < 1e-9);
    }

    #[test]
    fn test_georeference_from_tiepoint() {
        let bounds = georeference(
            Some(vec![0.01, 0.02, 0.0]),
            Some(vec![0.0, 0.0, 0.0, -76.5, 37.0, 0.0]),
            None,
            50,
            100,
        )
        .unwrap();
        assert!((bounds.max_lat - 37.0).abs() < 1e-12);
        assert!((bounds.min_lat - 36.0).abs() < 1e-9);
        assert!((bounds.min_lon + 76.5).abs() < 1e-12);
        assert!((bounds.max_lon + 75.5).abs() < 1e-9);
    }

    #[test]
    fn test_georeference_missing_tags() {
        assert!(georeference(None, None, None, 10, 10).is_err());
    }

    #[test]
    fn test_corrupt_bytes_unavailable() {
        let err = parse_elevation("test", b"not a tiff at all".to_vec()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataUnavailable);
    }
}
