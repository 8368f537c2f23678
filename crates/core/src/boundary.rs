//! Polygon boundary layers (MS4 service areas) loaded from `GeoJSON`
//!
//! Only polygonal geometry is accepted. Positions arrive in `GeoJSON` order
//! (`[lon, lat, (z)]`) and are stored as lat/lon vertices; elevation components
//! are ignored. Attributes are kept verbatim so consumers can read any column,
//! but the loader only interprets the locality name.

use crate::error::{PipelineError, PipelineResult};
use crate::geo::{GeoBounds, LatLon};
use crate::source::{fetch_bytes, DataSource, FetchOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Attribute holding the municipality name (matched case-insensitively)
pub const LOCALITY_ATTRIBUTE: &str = "locality";

/// One polygon: an exterior ring followed by zero or more holes
pub type Polygon = Vec<Vec<LatLon>>;

/// A boundary feature: one or more polygon parts plus its attribute row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryFeature {
    parts: Vec<Polygon>,
    attributes: Map<String, Value>,
}

impl BoundaryFeature {
    /// Polygon parts (a single entry unless the source geometry was a `MultiPolygon`)
    pub fn parts(&self) -> &[Polygon] {
        &self.parts
    }

    /// Full attribute row
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Attribute value by case-insensitive key
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Locality name, if the attribute is present and a string
    pub fn locality(&self) -> Option<&str> {
        self.attribute(LOCALITY_ATTRIBUTE).and_then(Value::as_str)
    }

    /// Every vertex of every ring
    pub fn vertices(&self) -> impl Iterator<Item = LatLon> + '_ {
        self.parts.iter().flatten().flatten().copied()
    }
}

/// Ordered, immutable collection of boundary features
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundaryFeatureSet {
    features: Vec<BoundaryFeature>,
}

impl BoundaryFeatureSet {
    /// Features in source order
    pub fn features(&self) -> &[BoundaryFeature] {
        &self.features
    }

    /// Number of features
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the set has no features (never true for a loaded set)
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Locality names in feature order; features without one are skipped
    pub fn localities(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter_map(BoundaryFeature::locality)
            .collect()
    }

    /// Bounding box of all vertices
    pub fn extent(&self) -> Option<GeoBounds> {
        GeoBounds::enclosing(self.features.iter().flat_map(BoundaryFeature::vertices))
    }
}

// Wire format. Only the members the loader reads are declared.

#[derive(Deserialize)]
struct FeatureCollectionDoc {
    #[serde(rename = "type")]
    kind: String,
    features: Vec<FeatureDoc>,
}

#[derive(Deserialize)]
struct FeatureDoc {
    geometry: Option<GeometryDoc>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct GeometryDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

fn convert_polygon(rings: Vec<Vec<Vec<f64>>>) -> Result<Polygon, String> {
    rings
        .into_iter()
        .map(|ring| {
            if ring.is_empty() {
                return Err("empty ring".to_string());
            }
            ring.into_iter()
                .map(|position| match position.as_slice() {
                    [lon, lat, ..] if lon.is_finite() && lat.is_finite() => {
                        Ok(LatLon { lat: *lat, lon: *lon })
                    }
                    other => Err(format!("invalid position {other:?}")),
                })
                .collect()
        })
        .collect()
}

fn convert_feature(index: usize, doc: FeatureDoc) -> Result<BoundaryFeature, String> {
    let Some(geometry) = doc.geometry else {
        return Err(format!("feature {index} has no geometry"));
    };
    let parts = match geometry.kind.as_str() {
        "Polygon" => {
            let rings: Vec<Vec<Vec<f64>>> = serde_json::from_value(geometry.coordinates)
                .map_err(|e| format!("feature {index}: {e}"))?;
            vec![convert_polygon(rings).map_err(|e| format!("feature {index}: {e}"))?]
        }
        "MultiPolygon" => {
            let polygons: Vec<Vec<Vec<Vec<f64>>>> = serde_json::from_value(geometry.coordinates)
                .map_err(|e| format!("feature {index}: {e}"))?;
            polygons
                .into_iter()
                .map(convert_polygon)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("feature {index}: {e}"))?
        }
        other => {
            return Err(format!(
                "feature {index} is not a Polygon or MultiPolygon ({other})"
            ))
        }
    };

    if parts.is_empty() || parts.iter().any(Vec::is_empty) {
        return Err(format!("feature {index} has empty geometry"));
    }

    Ok(BoundaryFeature {
        parts,
        attributes: doc.properties.unwrap_or_default(),
    })
}

/// Parse a `GeoJSON` `FeatureCollection` held in memory
///
/// # Errors
/// Returns `DataUnavailable` if the bytes are not a `FeatureCollection`, any
/// feature lacks usable polygon geometry, or there are no features.
pub fn parse_boundaries(origin: &str, bytes: &[u8]) -> PipelineResult<BoundaryFeatureSet> {
    let doc: FeatureCollectionDoc = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::unavailable(origin, format!("invalid GeoJSON: {e}")))?;

    if doc.kind != "FeatureCollection" {
        return Err(PipelineError::unavailable(
            origin,
            format!("expected a FeatureCollection, found '{}'", doc.kind),
        ));
    }
    if doc.features.is_empty() {
        return Err(PipelineError::unavailable(origin, "no features"));
    }

    let features = doc
        .features
        .into_iter()
        .enumerate()
        .map(|(i, f)| convert_feature(i, f))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|reason| PipelineError::unavailable(origin, reason))?;

    let set = BoundaryFeatureSet { features };
    let missing_locality = set.len() - set.localities().len();
    if missing_locality > 0 {
        warn!(
            source = origin,
            missing_locality, "Boundary features without a locality attribute"
        );
    }
    Ok(set)
}

/// Fetch and parse a boundary layer
///
/// # Errors
/// Returns `DataUnavailable` if the source cannot be fetched or is not valid
/// polygon `GeoJSON`.
pub fn load_boundaries(
    source: &DataSource,
    options: &FetchOptions,
) -> PipelineResult<BoundaryFeatureSet> {
    let origin = source.origin();
    let bytes = fetch_bytes(source, options)?;
    let set = parse_boundaries(&origin, &bytes)?;
    info!(source = %origin, features = set.len(), "Loaded boundary layer");
    Ok(set)
}
