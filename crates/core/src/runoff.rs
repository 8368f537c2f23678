//! Rain garden runoff reduction
//!
//! Static linear absorption model: each soil type absorbs a fixed volume of
//! water per square foot of garden.
//!
//! | Soil  | gal / sq ft |
//! |-------|-------------|
//! | Clay  | 0.2         |
//! | Sandy | 0.5         |
//! | Loamy | 0.7         |

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Smallest garden the model accepts (sq ft)
pub const MIN_GARDEN_SIZE_SQFT: f64 = 50.0;
/// Largest garden the model accepts (sq ft)
pub const MAX_GARDEN_SIZE_SQFT: f64 = 500.0;
/// Starting garden size offered to users (sq ft)
pub const DEFAULT_GARDEN_SIZE_SQFT: f64 = 100.0;

/// Accepted garden sizes, inclusive
pub const GARDEN_SIZE_RANGE: RangeInclusive<f64> = MIN_GARDEN_SIZE_SQFT..=MAX_GARDEN_SIZE_SQFT;

/// Soil beneath the rain garden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SoilProfile {
    /// Dense, slow-draining
    Clay,
    /// Coarse, fast-draining
    Sandy,
    /// Mixed loam
    Loamy,
}

impl SoilProfile {
    /// Every variant, in selector order
    pub const ALL: [SoilProfile; 3] = [SoilProfile::Clay, SoilProfile::Sandy, SoilProfile::Loamy];

    /// Gallons absorbed per square foot of garden
    pub const fn absorption_coefficient(self) -> f64 {
        match self {
            SoilProfile::Clay => 0.2,
            SoilProfile::Sandy => 0.5,
            SoilProfile::Loamy => 0.7,
        }
    }

    /// Display name
    pub const fn name(self) -> &'static str {
        match self {
            SoilProfile::Clay => "Clay",
            SoilProfile::Sandy => "Sandy",
            SoilProfile::Loamy => "Loamy",
        }
    }
}

impl fmt::Display for SoilProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SoilProfile {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        SoilProfile::ALL
            .into_iter()
            .find(|soil| soil.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                PipelineError::invalid_argument(
                    "soil",
                    format!("unknown soil type '{s}', expected Clay, Sandy or Loamy"),
                )
            })
    }
}

/// Estimated volume a garden absorbs
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunoffEstimate {
    size_sqft: f64,
    soil: SoilProfile,
    gallons: f64,
}

impl RunoffEstimate {
    /// Canonical (unrounded) reduction in gallons
    pub fn gallons(&self) -> f64 {
        self.gallons
    }

    /// Reduction rounded to two decimals, for display only
    pub fn rounded(&self) -> f64 {
        (self.gallons * 100.0).round() / 100.0
    }

    /// Garden size the estimate was computed for
    pub fn size_sqft(&self) -> f64 {
        self.size_sqft
    }

    /// Soil the estimate was computed for
    pub fn soil(&self) -> SoilProfile {
        self.soil
    }
}

impl fmt::Display for RunoffEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} gallons", self.gallons)
    }
}

/// Runoff reduction for a garden of `size_sqft` on `soil`
///
/// # Errors
/// Returns `InvalidArgument` if `size_sqft` is not within
/// [`GARDEN_SIZE_RANGE`].
pub fn estimate_runoff(size_sqft: f64, soil: SoilProfile) -> PipelineResult<RunoffEstimate> {
    if !GARDEN_SIZE_RANGE.contains(&size_sqft) {
        return Err(PipelineError::invalid_argument(
            "size_sqft",
            format!(
                "must be within [{MIN_GARDEN_SIZE_SQFT}, {MAX_GARDEN_SIZE_SQFT}], got {size_sqft}"
            ),
        ));
    }

    Ok(RunoffEstimate {
        size_sqft,
        soil,
        gallons: soil.absorption_coefficient() * size_sqft,
    })
}
