//! Per-segment variables
//!
//! Reduces property rasters over each segment's catchment (or over its own
//! pixels) to one value per segment. NoData and NaN pixels are skipped, and
//! a segment with no valid pixel gets NaN so batch runs never abort on
//! missing data.
//!
//! Unit-sensitive variables take a [`UnitFactors`] and use its values as
//! plain multipliers.

mod confinement;
mod named;

use serde::{Deserialize, Serialize};
use streamnet_core::raster::{Raster, RasterElement};
use streamnet_core::{Error, Result, UnitService};

use crate::network::{Network, SegmentId};

pub use confinement::ConfinementParams;

/// Reduction applied to the valid pixels of a scope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Statistic {
    Sum,
    Mean,
    Min,
    Max,
    Median,
    /// Population standard deviation
    StdDev,
    /// Population variance
    Variance,
    /// Number of valid pixels
    Count,
    /// Proportion of valid pixels strictly greater than the threshold
    FractionAbove(f64),
}

impl Statistic {
    /// Reduce `values`, returning NaN when there are none
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NAN;
        }
        let n = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let mean = sum / n;
        let variance = || values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

        match self {
            Statistic::Sum => sum,
            Statistic::Mean => mean,
            Statistic::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Statistic::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Statistic::StdDev => variance().sqrt(),
            Statistic::Variance => variance(),
            Statistic::Count => n,
            Statistic::FractionAbove(threshold) => {
                values.iter().filter(|&&v| v > threshold).count() as f64 / n
            }
        }
    }
}

/// Pixels a statistic is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Scope {
    /// Every pixel draining to the segment's outlet
    #[default]
    Catchment,
    /// The segment's own pixels
    Segment,
}

/// Numeric unit-conversion factors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitFactors {
    /// Meters per CRS base unit (horizontal)
    pub meters_per_unit: f64,
    /// DEM vertical units per meter
    pub dem_per_m: f64,
}

impl Default for UnitFactors {
    fn default() -> Self {
        Self {
            meters_per_unit: 1.0,
            dem_per_m: 1.0,
        }
    }
}

impl UnitFactors {
    /// Horizontal factor for the network's CRS, evaluated at the grid's
    /// central y-coordinate
    pub fn from_network(network: &Network, units: &dyn UnitService, dem_per_m: f64) -> Result<Self> {
        let flow = network.flow();
        let crs = flow.crs().ok_or(Error::MissingCrs {
            operation: "derive unit factors",
        })?;
        let (_, min_y, _, max_y) = flow.transform().bounds(flow.rows(), flow.cols());
        let base_per_meter = units.base_per_meter(crs, (min_y + max_y) / 2.0)?;
        Ok(Self {
            meters_per_unit: 1.0 / base_per_meter,
            dem_per_m,
        })
    }

    /// Area of one pixel in square meters
    pub(crate) fn pixel_area_m2(&self, network: &Network) -> f64 {
        network.flow().transform().pixel_area() * self.meters_per_unit * self.meters_per_unit
    }
}

impl Network {
    /// Reduce a property raster over one segment's scope
    pub fn aggregate<T: RasterElement>(
        &self,
        id: SegmentId,
        raster: &Raster<T>,
        statistic: Statistic,
        scope: Scope,
    ) -> Result<f64> {
        raster.ensure_shape("property raster", self.flow().shape())?;
        let values = self.scope_values(id, raster, scope)?;
        Ok(statistic.apply(&values))
    }

    /// [`Network::aggregate`] for every live segment, in ID order
    pub fn aggregate_all<T: RasterElement>(
        &self,
        raster: &Raster<T>,
        statistic: Statistic,
        scope: Scope,
    ) -> Result<Vec<f64>> {
        raster.ensure_shape("property raster", self.flow().shape())?;
        self.ids()
            .into_iter()
            .map(|id| Ok(statistic.apply(&self.scope_values(id, raster, scope)?)))
            .collect()
    }

    /// Pixels of a segment's scope, as (row, col)
    pub(crate) fn scope_pixels(&self, id: SegmentId, scope: Scope) -> Result<Vec<(usize, usize)>> {
        Ok(match scope {
            Scope::Catchment => self.catchment(id)?.coords().collect(),
            Scope::Segment => self.segment(id)?.pixels().to_vec(),
        })
    }

    fn scope_values<T: RasterElement>(&self, id: SegmentId, raster: &Raster<T>, scope: Scope) -> Result<Vec<f64>> {
        Ok(self
            .scope_pixels(id, scope)?
            .into_iter()
            .filter_map(|(row, col)| raster.valid_f64(row, col))
            .collect())
    }
}
