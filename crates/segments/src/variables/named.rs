//! Named hazard-model inputs
//!
//! Each variable is a specialization of catchment or segment aggregation.
//! Results are one value per live segment, in ID order.

use streamnet_core::raster::{Raster, RasterElement};
use streamnet_core::Result;

use super::{Scope, Statistic, UnitFactors};
use crate::flow::catchment_sizes;
use crate::network::{Network, SegmentId};

impl Network {
    /// Number of pixels in each segment's catchment
    pub fn npixels(&self) -> Vec<u64> {
        let sizes = catchment_sizes(self.flow());
        self.segments()
            .map(|segment| {
                let (row, col) = segment.outlet();
                sizes[[row, col]]
            })
            .collect()
    }

    /// Catchment area in square kilometers, optionally counting only pixels
    /// inside `mask` (non-zero, valid values)
    pub fn area<T: RasterElement>(&self, mask: Option<&Raster<T>>, factors: &UnitFactors) -> Result<Vec<f64>> {
        let pixel_km2 = factors.pixel_area_m2(self) / 1.0e6;
        let counts = match mask {
            None => self.npixels().into_iter().map(|n| n as f64).collect(),
            Some(mask) => self.masked_counts(mask, Scope::Catchment)?,
        };
        Ok(counts.into_iter().map(|n| n * pixel_km2).collect())
    }

    /// Burned catchment area in square kilometers
    pub fn burned_area<T: RasterElement>(&self, burned: &Raster<T>, factors: &UnitFactors) -> Result<Vec<f64>> {
        self.area(Some(burned), factors)
    }

    /// Developed catchment area in square kilometers
    pub fn developed_area<T: RasterElement>(&self, developed: &Raster<T>, factors: &UnitFactors) -> Result<Vec<f64>> {
        self.area(Some(developed), factors)
    }

    /// Proportion of each catchment inside `mask`
    pub fn upslope_ratio<T: RasterElement>(&self, mask: &Raster<T>) -> Result<Vec<f64>> {
        let inside = self.masked_counts(mask, Scope::Catchment)?;
        Ok(inside
            .into_iter()
            .zip(self.npixels())
            .map(|(inside, total)| inside / total as f64)
            .collect())
    }

    /// Proportion of each catchment that is burned
    pub fn burn_ratio<T: RasterElement>(&self, burned: &Raster<T>) -> Result<Vec<f64>> {
        self.upslope_ratio(burned)
    }

    /// Mean catchment soil KF-factor
    pub fn kf_factor<T: RasterElement>(&self, kf: &Raster<T>) -> Result<Vec<f64>> {
        self.aggregate_all(kf, Statistic::Mean, Scope::Catchment)
    }

    /// Mean catchment dNBR divided by 1000
    pub fn scaled_dnbr<T: RasterElement>(&self, dnbr: &Raster<T>) -> Result<Vec<f64>> {
        Ok(self
            .aggregate_all(dnbr, Statistic::Mean, Scope::Catchment)?
            .into_iter()
            .map(|mean| mean / 1000.0)
            .collect())
    }

    /// Mean catchment soil thickness divided by 100
    pub fn scaled_thickness<T: RasterElement>(&self, thickness: &Raster<T>) -> Result<Vec<f64>> {
        Ok(self
            .aggregate_all(thickness, Statistic::Mean, Scope::Catchment)?
            .into_iter()
            .map(|mean| mean / 100.0)
            .collect())
    }

    /// Mean catchment sin(theta), from a raster of slope sines
    pub fn sine_theta<T: RasterElement>(&self, sine_thetas: &Raster<T>) -> Result<Vec<f64>> {
        self.aggregate_all(sine_thetas, Statistic::Mean, Scope::Catchment)
    }

    /// Mean slope along each segment's own pixels
    pub fn slope<T: RasterElement>(&self, slopes: &Raster<T>) -> Result<Vec<f64>> {
        self.aggregate_all(slopes, Statistic::Mean, Scope::Segment)
    }

    /// Vertical relief at each segment's outlet
    pub fn relief<T: RasterElement>(&self, relief: &Raster<T>) -> Result<Vec<f64>> {
        relief.ensure_shape("relief raster", self.flow().shape())?;
        Ok(self
            .segments()
            .map(|segment| {
                let (row, col) = segment.outlet();
                relief.valid_f64(row, col).unwrap_or(f64::NAN)
            })
            .collect())
    }

    /// Outlet relief in meters divided by the square root of the catchment
    /// area in square meters
    pub fn ruggedness<T: RasterElement>(&self, relief: &Raster<T>, factors: &UnitFactors) -> Result<Vec<f64>> {
        let pixel_m2 = factors.pixel_area_m2(self);
        Ok(self
            .relief(relief)?
            .into_iter()
            .zip(self.npixels())
            .map(|(relief, n)| (relief / factors.dem_per_m) / (n as f64 * pixel_m2).sqrt())
            .collect())
    }

    /// Whether any of a segment's own pixels lies inside `mask`
    pub fn in_mask<T: RasterElement>(&self, mask: &Raster<T>) -> Result<Vec<bool>> {
        Ok(self
            .masked_counts(mask, Scope::Segment)?
            .into_iter()
            .map(|inside| inside > 0.0)
            .collect())
    }

    /// Whether any of a segment's own pixels lies inside the fire perimeter
    pub fn in_perimeter<T: RasterElement>(&self, perimeter: &Raster<T>) -> Result<Vec<bool>> {
        self.in_mask(perimeter)
    }

    /// Weighted flow accumulation at each outlet: the catchment sum of
    /// `weights`
    pub fn accumulation<T: RasterElement>(&self, weights: &Raster<T>) -> Result<Vec<f64>> {
        self.aggregate_all(weights, Statistic::Sum, Scope::Catchment)
    }

    /// Number of scope pixels whose mask value is valid and non-zero
    fn masked_counts<T: RasterElement>(&self, mask: &Raster<T>, scope: Scope) -> Result<Vec<f64>> {
        mask.ensure_shape("mask raster", self.flow().shape())?;
        self.ids()
            .into_iter()
            .map(|id: SegmentId| {
                let pixels = self.scope_pixels(id, scope)?;
                let inside = pixels
                    .into_iter()
                    .filter(|&(row, col)| mask.valid_f64(row, col).is_some_and(|v| v != 0.0))
                    .count();
                Ok(inside as f64)
            })
            .collect()
    }
}
