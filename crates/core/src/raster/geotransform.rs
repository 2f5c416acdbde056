//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and CRS coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are 0,
/// and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// CRS coordinates of the center of pixel (row, col)
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// CRS coordinates of the upper-left corner of pixel (row, col)
    pub fn pixel_corner(&self, row: usize, col: usize) -> (f64, f64) {
        self.apply(col as f64, row as f64)
    }

    fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Absolute pixel resolution (dx, dy) in CRS base units
    pub fn resolution(&self) -> (f64, f64) {
        let dx = self.pixel_width.hypot(self.col_rotation);
        let dy = self.pixel_height.hypot(self.row_rotation);
        (dx, dy)
    }

    /// Area of one pixel in squared CRS base units
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation).abs()
    }

    /// Distance between the centers of two pixels that are `dr` rows and
    /// `dc` columns apart, in CRS base units
    pub fn step_length(&self, dr: isize, dc: isize) -> f64 {
        let (dx, dy) = self.resolution();
        (dc as f64 * dx).hypot(dr as f64 * dy)
    }

    /// Bounding box (min_x, min_y, max_x, max_y) of a raster of given dimensions
    pub fn bounds(&self, rows: usize, cols: usize) -> (f64, f64, f64, f64) {
        let corners = [
            self.pixel_corner(0, 0),
            self.pixel_corner(0, cols),
            self.pixel_corner(rows, 0),
            self.pixel_corner(rows, cols),
        ];
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_center() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);
        let (x, y) = gt.pixel_center(10, 5);
        assert_relative_eq!(x, 155.0);
        assert_relative_eq!(y, 95.0);
    }

    #[test]
    fn test_step_length_diagonal() {
        let gt = GeoTransform::new(0.0, 0.0, 10.0, -10.0);
        assert_relative_eq!(gt.step_length(0, 1), 10.0);
        assert_relative_eq!(gt.step_length(1, 1), 10.0 * std::f64::consts::SQRT_2);
        assert_relative_eq!(gt.pixel_area(), 100.0);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }
}
