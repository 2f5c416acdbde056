//! Read-only D8 flow-direction grid
//!
//! Flow directions follow the TauDEM encoding:
//! ```text
//!   4  3  2
//!   5  .  1
//!   6  7  8
//! ```
//! Any other value (including 0 and the raster's no-data value) is NoData.
//! ESRI-style power-of-two codes are translated at construction.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use streamnet_core::raster::{GeoTransform, Raster, RasterElement};
use streamnet_core::{Error, Result, CRS};
use tracing::debug;

/// D8 neighbor offsets: (row_offset, col_offset), indexed by `code - 1`
pub const D8_OFFSETS: [(isize, isize); 8] = [
    (0, 1),   // 1: E
    (-1, 1),  // 2: NE
    (-1, 0),  // 3: N
    (-1, -1), // 4: NW
    (0, -1),  // 5: W
    (1, -1),  // 6: SW
    (1, 0),   // 7: S
    (1, 1),   // 8: SE
];

/// ESRI codes in TauDEM order (E, NE, N, NW, W, SW, S, SE)
const ESRI_CODES: [u32; 8] = [1, 128, 64, 32, 16, 8, 4, 2];

/// Stored code for NoData cells
const NODATA: u8 = 0;

/// Direction code pointing the opposite way
pub fn opposite_dir(dir: u8) -> u8 {
    if dir == 0 {
        return 0;
    }
    ((dir - 1 + 4) % 8) + 1
}

/// Encoding of the incoming flow-direction raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DirectionEncoding {
    /// 1=E, 2=NE, 3=N, 4=NW, 5=W, 6=SW, 7=S, 8=SE
    #[default]
    TauDem,
    /// 1=E, 2=SE, 4=S, 8=SW, 16=W, 32=NW, 64=N, 128=NE
    Esri,
}

impl DirectionEncoding {
    fn translate(self, value: f64) -> u8 {
        if value.fract() != 0.0 || value < 1.0 {
            return NODATA;
        }
        match self {
            DirectionEncoding::TauDem if value <= 8.0 => value as u8,
            DirectionEncoding::TauDem => NODATA,
            DirectionEncoding::Esri => {
                let code = value as u32;
                ESRI_CODES
                    .iter()
                    .position(|&esri| esri == code)
                    .map_or(NODATA, |idx| (idx + 1) as u8)
            }
        }
    }
}

/// Immutable view over a D8 flow-direction raster and its spatial metadata.
///
/// Pixels are addressed either by (row, col) or by their row-major flat
/// index `row * cols + col`.
#[derive(Debug, Clone)]
pub struct FlowGrid {
    codes: Array2<u8>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata_cells: usize,
}

impl FlowGrid {
    /// Build from a TauDEM-encoded raster
    pub fn from_taudem<T: RasterElement>(raster: &Raster<T>) -> Result<Self> {
        Self::with_encoding(raster, DirectionEncoding::TauDem)
    }

    /// Build from an ESRI-encoded raster, translating codes to TauDEM
    pub fn from_esri<T: RasterElement>(raster: &Raster<T>) -> Result<Self> {
        Self::with_encoding(raster, DirectionEncoding::Esri)
    }

    /// Build from a raster in the given encoding.
    ///
    /// Fails with [`Error::EmptyFlowDirections`] if no cell holds a valid code.
    pub fn with_encoding<T: RasterElement>(
        raster: &Raster<T>,
        encoding: DirectionEncoding,
    ) -> Result<Self> {
        let codes = raster.data().map(|&value| {
            if raster.is_nodata(value) {
                return NODATA;
            }
            value.to_f64().map_or(NODATA, |v| encoding.translate(v))
        });

        let nodata_cells = codes.iter().filter(|&&code| code == NODATA).count();
        if nodata_cells == codes.len() {
            return Err(Error::EmptyFlowDirections);
        }
        debug!(
            rows = raster.rows(),
            cols = raster.cols(),
            nodata_cells,
            ?encoding,
            "loaded flow directions"
        );

        Ok(Self {
            codes,
            transform: *raster.transform(),
            crs: raster.crs().cloned(),
            nodata_cells,
        })
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.codes.dim()
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.codes.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.codes.ncols()
    }

    /// Total number of pixels
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Whether the grid has no pixels
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Number of NoData pixels
    pub fn nodata_cells(&self) -> usize {
        self.nodata_cells
    }

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Row-major flat index of (row, col)
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols() + col
    }

    /// (row, col) of a flat index
    pub fn coords(&self, idx: usize) -> (usize, usize) {
        (idx / self.cols(), idx % self.cols())
    }

    /// TauDEM direction code at (row, col), or `None` for NoData
    pub fn direction(&self, row: usize, col: usize) -> Option<u8> {
        match self.codes.get((row, col)) {
            Some(&NODATA) | None => None,
            Some(&code) => Some(code),
        }
    }

    /// The pixel (row, col) drains into, if it is on the grid.
    ///
    /// Returns `None` for NoData pixels and for directions pointing off-grid.
    pub fn downstream(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        let code = self.direction(row, col)?;
        let (dr, dc) = D8_OFFSETS[(code - 1) as usize];
        self.offset(row, col, dr, dc)
    }

    /// Flat-index form of [`FlowGrid::downstream`]
    pub fn downstream_index(&self, idx: usize) -> Option<usize> {
        let (row, col) = self.coords(idx);
        self.downstream(row, col).map(|(r, c)| self.index(r, c))
    }

    /// Append the flat indices of every pixel draining directly into `idx`
    pub fn upstream_indices(&self, idx: usize, out: &mut Vec<usize>) {
        let (row, col) = self.coords(idx);
        for (k, &(dr, dc)) in D8_OFFSETS.iter().enumerate() {
            let Some((nr, nc)) = self.offset(row, col, dr, dc) else {
                continue;
            };
            // The neighbor in direction k drains here if its code points back.
            if self.direction(nr, nc) == Some(opposite_dir((k + 1) as u8)) {
                out.push(self.index(nr, nc));
            }
        }
    }

    /// The pixel `dr` rows and `dc` columns from (row, col), if on the grid
    pub fn offset(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<(usize, usize)> {
        let nr = row as isize + dr;
        let nc = col as isize + dc;
        if nr < 0 || nc < 0 || nr >= self.rows() as isize || nc >= self.cols() as isize {
            return None;
        }
        Some((nr as usize, nc as usize))
    }

    /// Distance between the centers of (row, col) and its downstream pixel
    /// in CRS base units, or `None` when the pixel has no downstream pixel
    pub fn step_length(&self, row: usize, col: usize) -> Option<f64> {
        let (nr, nc) = self.downstream(row, col)?;
        Some(self.transform.step_length(
            nr as isize - row as isize,
            nc as isize - col as isize,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(codes: Vec<u8>, rows: usize, cols: usize) -> FlowGrid {
        FlowGrid::from_taudem(&Raster::from_vec(codes, rows, cols).unwrap()).unwrap()
    }

    #[test]
    fn test_opposite_direction() {
        assert_eq!(opposite_dir(1), 5); // E → W
        assert_eq!(opposite_dir(3), 7); // N → S
        assert_eq!(opposite_dir(5), 1); // W → E
        assert_eq!(opposite_dir(7), 3); // S → N
        assert_eq!(opposite_dir(2), 6); // NE → SW
        assert_eq!(opposite_dir(8), 4); // SE → NW
    }

    #[test]
    fn test_downstream_follows_taudem_codes() {
        // Center pixel of a 3x3 grid pointing in each direction
        let expected = [(1, 2), (0, 2), (0, 1), (0, 0), (1, 0), (2, 0), (2, 1), (2, 2)];
        for (code, want) in (1..=8_u8).zip(expected) {
            let mut codes = vec![7_u8; 9];
            codes[4] = code;
            let flow = grid(codes, 3, 3);
            assert_eq!(flow.downstream(1, 1), Some(want), "code {}", code);
        }
    }

    #[test]
    fn test_off_grid_and_nodata() {
        let flow = grid(vec![3, 0, 9, 7], 2, 2);
        assert_eq!(flow.downstream(0, 0), None); // N off-grid
        assert_eq!(flow.direction(0, 1), None); // 0 is NoData
        assert_eq!(flow.direction(1, 0), None); // 9 is not a D8 code
        assert_eq!(flow.downstream(1, 1), None); // S off-grid
        assert_eq!(flow.nodata_cells(), 2);
    }

    #[test]
    fn test_upstream_indices() {
        // Everything drains into the center
        let flow = grid(vec![8, 7, 6, 1, 7, 5, 2, 3, 4], 3, 3);
        let mut up = Vec::new();
        flow.upstream_indices(4, &mut up);
        up.sort_unstable();
        assert_eq!(up, vec![0, 1, 2, 3, 5, 6, 7, 8]);
    }

    #[test]
    fn test_esri_translation() {
        // ESRI: 1=E, 2=SE, 4=S, 64=N, 128=NE
        let raster = Raster::from_vec(vec![1_u8, 2, 4, 64, 128, 3], 2, 3).unwrap();
        let flow = FlowGrid::from_esri(&raster).unwrap();
        assert_eq!(flow.direction(0, 0), Some(1));
        assert_eq!(flow.direction(0, 1), Some(8));
        assert_eq!(flow.direction(0, 2), Some(7));
        assert_eq!(flow.direction(1, 0), Some(3));
        assert_eq!(flow.direction(1, 1), Some(2));
        assert_eq!(flow.direction(1, 2), None);
    }

    #[test]
    fn test_empty_encoding_is_error() {
        let raster = Raster::filled(4, 4, 0_u8);
        assert!(matches!(
            FlowGrid::from_taudem(&raster),
            Err(Error::EmptyFlowDirections)
        ));
    }

    #[test]
    fn test_raster_nodata_value_is_respected() {
        let mut raster = Raster::from_vec(vec![1.0_f64, -1.0, 3.0, 2.5], 2, 2).unwrap();
        raster.set_nodata(Some(3.0));
        let flow = FlowGrid::from_taudem(&raster).unwrap();
        assert_eq!(flow.direction(0, 0), Some(1));
        assert_eq!(flow.direction(0, 1), None);
        assert_eq!(flow.direction(1, 0), None);
        assert_eq!(flow.direction(1, 1), None);
    }
}
