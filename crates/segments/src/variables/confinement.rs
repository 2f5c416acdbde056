//! Confinement angles
//!
//! For every pixel of a segment, looks across the channel in both
//! directions perpendicular to its flow and measures the steepest rise
//! within `neighborhood` pixels. The two rise angles are subtracted from
//! 180 degrees, so a narrow, steep-walled channel scores low and an open
//! floodplain scores close to 180. A segment's confinement is the mean over
//! its pixels.

use serde::{Deserialize, Serialize};
use streamnet_core::raster::{Raster, RasterElement};
use streamnet_core::{Error, Result};

use super::UnitFactors;
use crate::flow::{FlowGrid, D8_OFFSETS};
use crate::network::Network;

/// Parameters for [`Network::confinement`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfinementParams {
    /// Pixels searched on each side of the channel. Default: 4
    pub neighborhood: usize,
}

impl Default for ConfinementParams {
    fn default() -> Self {
        Self { neighborhood: 4 }
    }
}

/// Direction codes a quarter turn either side of `code`
fn perpendicular(code: u8) -> [u8; 2] {
    let zero_based = code - 1;
    [(zero_based + 2) % 8 + 1, (zero_based + 6) % 8 + 1]
}

impl Network {
    /// Confinement angle in degrees for every live segment, in ID order.
    ///
    /// Pixels with NoData flow, NoData elevation, or no valid neighbor on
    /// one side are left out of a segment's mean; a segment with no usable
    /// pixel gets NaN.
    pub fn confinement<T: RasterElement>(
        &self,
        dem: &Raster<T>,
        params: &ConfinementParams,
        factors: &UnitFactors,
    ) -> Result<Vec<f64>> {
        dem.ensure_shape("DEM", self.flow().shape())?;
        if params.neighborhood == 0 {
            return Err(Error::InvalidParameter {
                name: "neighborhood",
                value: "0".into(),
                reason: "must search at least one pixel".into(),
            });
        }

        Ok(self
            .segments()
            .map(|segment| {
                let angles: Vec<f64> = segment
                    .pixels()
                    .iter()
                    .filter_map(|&(row, col)| pixel_confinement(self.flow(), dem, row, col, params, factors))
                    .collect();
                if angles.is_empty() {
                    f64::NAN
                } else {
                    angles.iter().sum::<f64>() / angles.len() as f64
                }
            })
            .collect())
    }
}

fn pixel_confinement<T: RasterElement>(
    flow: &FlowGrid,
    dem: &Raster<T>,
    row: usize,
    col: usize,
    params: &ConfinementParams,
    factors: &UnitFactors,
) -> Option<f64> {
    let code = flow.direction(row, col)?;
    let center = dem.valid_f64(row, col)?;

    let mut total = 180.0;
    for side in perpendicular(code) {
        let (dr, dc) = D8_OFFSETS[(side - 1) as usize];
        let max_rise = (1..=params.neighborhood as isize)
            .filter_map(|k| flow.offset(row, col, dr * k, dc * k))
            .filter_map(|(r, c)| dem.valid_f64(r, c))
            .map(|height| height - center)
            .fold(None, |max: Option<f64>, rise| Some(max.map_or(rise, |m| m.max(rise))))?;

        // Horizontal run in DEM units
        let run = params.neighborhood as f64
            * flow.transform().step_length(dr, dc)
            * factors.meters_per_unit
            * factors.dem_per_m;
        total -= (max_rise / run).atan().to_degrees();
    }
    Some(total)
}
