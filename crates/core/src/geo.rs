//! Geographic primitives shared by the loaders
//!
//! Coordinates are plain WGS84 degrees. No projection math lives here: inputs
//! are expected to be pre-aligned.

use serde::Serialize;

/// A single polygon vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
}

/// Axis-aligned lat/lon rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoBounds {
    /// Southern edge
    pub min_lat: f64,
    /// Northern edge
    pub max_lat: f64,
    /// Western edge
    pub min_lon: f64,
    /// Eastern edge
    pub max_lon: f64,
}

impl GeoBounds {
    /// Smallest rectangle covering every point, or `None` for an empty input
    pub fn enclosing(points: impl IntoIterator<Item = LatLon>) -> Option<Self> {
        points.into_iter().fold(None, |acc, p| {
            Some(match acc {
                None => GeoBounds {
                    min_lat: p.lat,
                    max_lat: p.lat,
                    min_lon: p.lon,
                    max_lon: p.lon,
                },
                Some(b) => GeoBounds {
                    min_lat: b.min_lat.min(p.lat),
                    max_lat: b.max_lat.max(p.lat),
                    min_lon: b.min_lon.min(p.lon),
                    max_lon: b.max_lon.max(p.lon),
                },
            })
        })
    }

    /// Midpoint of the rectangle
    pub fn center(&self) -> LatLon {
        LatLon {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lon: (self.min_lon + self.max_lon) / 2.0,
        }
    }

    /// Whether the point lies inside or on the edge
    pub fn contains(&self, point: LatLon) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.lat)
            && (self.min_lon..=self.max_lon).contains(&point.lon)
    }
}
