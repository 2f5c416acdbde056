//! Delineation mask
//!
//! Marks the pixels that belong to the stream network by thresholding a
//! flow accumulation raster: pixels with accumulation >= the threshold
//! are in-network. An optional weighted accumulation (for example
//! burned-area accumulation) adds a second criterion that must also hold.
//!
//! The output is a binary raster (1 = in-network, 0 = not).

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use streamnet_core::raster::Raster;
use streamnet_core::{Algorithm, Error, Result};
use tracing::debug;

/// Parameters for the delineation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelineationParams {
    /// Minimum flow accumulation (in pixels) for a pixel to be in-network.
    /// Default: 250.0
    pub min_accumulation: f64,
    /// Minimum weighted accumulation, checked only when a weighted
    /// accumulation raster is supplied. Default: 0.0
    pub min_weighted: f64,
}

impl Default for DelineationParams {
    fn default() -> Self {
        Self {
            min_accumulation: 250.0,
            min_weighted: 0.0,
        }
    }
}

/// Inputs to [`Delineation`]: accumulation plus optional weighted accumulation
#[derive(Debug, Clone)]
pub struct DelineationInput {
    pub accumulation: Raster<f64>,
    pub weighted: Option<Raster<f64>>,
}

/// Delineation-mask algorithm
#[derive(Debug, Clone, Default)]
pub struct Delineation;

impl Algorithm for Delineation {
    type Input = DelineationInput;
    type Output = Raster<u8>;
    type Params = DelineationParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Delineation Mask"
    }

    fn description(&self) -> &'static str {
        "Threshold flow accumulation into an in-network pixel mask"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        delineation_mask(&input.accumulation, input.weighted.as_ref(), &params)
    }
}

/// Build the in-network mask from flow accumulation.
///
/// # Arguments
/// * `accumulation` - Flow accumulation raster (pixel counts)
/// * `weighted` - Optional weighted accumulation of the same shape
/// * `params` - Thresholds
///
/// # Returns
/// Raster<u8> with 1 = in-network pixel, 0 = not. NaN and no-data
/// accumulation values are never in-network.
pub fn delineation_mask(
    accumulation: &Raster<f64>,
    weighted: Option<&Raster<f64>>,
    params: &DelineationParams,
) -> Result<Raster<u8>> {
    let (rows, cols) = accumulation.shape();
    if let Some(weighted) = weighted {
        weighted.ensure_shape("weighted accumulation", (rows, cols))?;
    }
    if params.min_accumulation.is_nan() {
        return Err(Error::InvalidParameter {
            name: "min_accumulation",
            value: "NaN".into(),
            reason: "threshold must be a number".into(),
        });
    }

    let mut mask = Array2::<u8>::zeros((rows, cols));
    let mut count = 0_usize;
    for row in 0..rows {
        for col in 0..cols {
            let Some(acc) = accumulation.valid_f64(row, col) else {
                continue;
            };
            if acc < params.min_accumulation {
                continue;
            }
            if let Some(weighted) = weighted {
                match weighted.valid_f64(row, col) {
                    Some(w) if w >= params.min_weighted => {}
                    _ => continue,
                }
            }
            mask[(row, col)] = 1;
            count += 1;
        }
    }
    debug!(count, threshold = params.min_accumulation, "delineated network pixels");

    let mut output = accumulation.with_same_meta::<u8>();
    *output.data_mut() = mask;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulation() -> Raster<f64> {
        Raster::from_vec(vec![0.0, 1.0, 5.0, f64::NAN, 10.0, 2.0], 2, 3).unwrap()
    }

    #[test]
    fn test_threshold() {
        let params = DelineationParams {
            min_accumulation: 2.0,
            ..Default::default()
        };
        let mask = delineation_mask(&accumulation(), None, &params).unwrap();
        assert_eq!(mask.data().iter().copied().collect::<Vec<_>>(), vec![0, 0, 1, 0, 1, 1]);
    }

    #[test]
    fn test_weighted_threshold_also_applies() {
        let weighted = Raster::from_vec(vec![9.0, 9.0, 0.5, 9.0, 3.0, f64::NAN], 2, 3).unwrap();
        let params = DelineationParams {
            min_accumulation: 2.0,
            min_weighted: 1.0,
        };
        let mask = delineation_mask(&accumulation(), Some(&weighted), &params).unwrap();
        assert_eq!(mask.data().iter().copied().collect::<Vec<_>>(), vec![0, 0, 0, 0, 1, 0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let weighted = Raster::filled(3, 3, 1.0);
        let result = delineation_mask(&accumulation(), Some(&weighted), &DelineationParams::default());
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_algorithm_trait() {
        let input = DelineationInput {
            accumulation: accumulation(),
            weighted: None,
        };
        let mask = Delineation.execute_default(input).unwrap();
        assert!(mask.data().iter().all(|&v| v == 0));
    }
}
