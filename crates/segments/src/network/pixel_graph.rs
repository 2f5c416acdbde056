//! Pixel-level flow forest
//!
//! Restricts the D8 flow graph to in-network pixels. Every in-network pixel
//! has at most one downstream in-network pixel; it has none when its flow
//! points off-grid, into an out-of-network pixel, or when its own direction
//! is NoData. The last case is recorded rather than rejected because it
//! reflects raster edge conditions.

use streamnet_core::raster::Raster;
use streamnet_core::{Error, Result};
use tracing::warn;

use crate::flow::FlowGrid;

/// In-network pixel forest derived from a flow grid and a mask
#[derive(Debug, Clone)]
pub struct PixelGraph {
    cols: usize,
    in_network: Vec<bool>,
    downstream: Vec<Option<usize>>,
    in_degree: Vec<u8>,
    nodata_outlets: Vec<(usize, usize)>,
    size: usize,
}

impl PixelGraph {
    /// Build the forest for pixels where `mask` is non-zero.
    ///
    /// Fails on a mask whose shape differs from the flow grid, and on flow
    /// directions that cycle among in-network pixels.
    pub fn new(flow: &FlowGrid, mask: &Raster<u8>) -> Result<Self> {
        mask.ensure_shape("delineation mask", flow.shape())?;
        let (rows, cols) = flow.shape();
        let n = rows * cols;

        let mut in_network = vec![false; n];
        let mut size = 0;
        for ((row, col), &value) in mask.data().indexed_iter() {
            if value != 0 && !mask.is_nodata(value) {
                in_network[row * cols + col] = true;
                size += 1;
            }
        }

        let mut downstream = vec![None; n];
        let mut in_degree = vec![0_u8; n];
        let mut nodata_outlets = Vec::new();
        for idx in (0..n).filter(|&idx| in_network[idx]) {
            let (row, col) = (idx / cols, idx % cols);
            if flow.direction(row, col).is_none() {
                nodata_outlets.push((row, col));
                continue;
            }
            if let Some(down) = flow.downstream_index(idx).filter(|&d| in_network[d]) {
                downstream[idx] = Some(down);
                in_degree[down] += 1;
            }
        }

        if !nodata_outlets.is_empty() {
            warn!(
                count = nodata_outlets.len(),
                first = ?nodata_outlets[0],
                "in-network pixels with NoData flow direction end their segments"
            );
        }

        let graph = Self {
            cols,
            in_network,
            downstream,
            in_degree,
            nodata_outlets,
            size,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Kahn's algorithm over in-network pixels: anything never reaching
    /// in-degree zero lies on (or below) a cycle.
    fn check_acyclic(&self) -> Result<()> {
        let mut remaining = self.in_degree.clone();
        let mut queue: Vec<usize> = self.heads().collect();
        let mut visited = 0;
        while let Some(idx) = queue.pop() {
            visited += 1;
            if let Some(down) = self.downstream[idx] {
                remaining[down] -= 1;
                if remaining[down] == 0 {
                    queue.push(down);
                }
            }
        }
        if visited == self.size {
            return Ok(());
        }
        let idx = (0..self.in_network.len())
            .find(|&idx| self.in_network[idx] && remaining[idx] > 0)
            .unwrap_or(0);
        Err(Error::FlowCycle {
            row: idx / self.cols,
            col: idx % self.cols,
        })
    }

    /// Number of in-network pixels
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether no pixel is in-network
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the pixel at flat index `idx` is in-network
    pub fn is_in_network(&self, idx: usize) -> bool {
        self.in_network.get(idx).copied().unwrap_or(false)
    }

    /// Downstream in-network pixel of `idx`
    pub fn downstream(&self, idx: usize) -> Option<usize> {
        self.downstream.get(idx).copied().flatten()
    }

    /// Number of in-network pixels draining directly into `idx`
    pub fn in_degree(&self, idx: usize) -> u8 {
        self.in_degree.get(idx).copied().unwrap_or(0)
    }

    /// In-network pixel with no in-network inflow
    pub fn is_head(&self, idx: usize) -> bool {
        self.is_in_network(idx) && self.in_degree(idx) == 0
    }

    /// In-network pixel where two or more in-network flow paths meet
    pub fn is_confluence(&self, idx: usize) -> bool {
        self.is_in_network(idx) && self.in_degree(idx) >= 2
    }

    /// Head pixels in row-major order
    pub fn heads(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.in_network.len()).filter(|&idx| self.is_head(idx))
    }

    /// In-network pixels whose own flow direction is NoData
    pub fn nodata_outlets(&self) -> &[(usize, usize)] {
        &self.nodata_outlets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_grids::{flow_from, mask_from};

    #[test]
    fn test_heads_and_confluences() {
        // Two pixels in the top row drain into (1,1), which drains south
        let flow = flow_from(vec![8, 7, 7, 7, 7, 7, 7, 7, 7], 3, 3);
        let mask = mask_from(&[(0, 0), (0, 1), (1, 1), (2, 1)], 3, 3);
        let graph = PixelGraph::new(&flow, &mask).unwrap();

        assert_eq!(graph.len(), 4);
        assert_eq!(graph.heads().collect::<Vec<_>>(), vec![0, 1]);
        assert!(graph.is_confluence(4));
        assert_eq!(graph.downstream(4), Some(7));
        assert_eq!(graph.downstream(7), None); // off-grid
        assert!(!graph.is_in_network(3));
    }

    #[test]
    fn test_out_of_network_target_is_outlet() {
        let flow = flow_from(vec![7, 7, 7, 7], 2, 2);
        let mask = mask_from(&[(0, 0)], 2, 2);
        let graph = PixelGraph::new(&flow, &mask).unwrap();
        assert_eq!(graph.downstream(0), None);
        assert!(graph.is_head(0));
    }

    #[test]
    fn test_nodata_direction_is_reported_outlet() {
        let flow = flow_from(vec![7, 7, 0, 7], 2, 2);
        let mask = mask_from(&[(0, 0), (1, 0)], 2, 2);
        let graph = PixelGraph::new(&flow, &mask).unwrap();
        assert_eq!(graph.downstream(0), Some(2));
        assert_eq!(graph.downstream(2), None);
        assert_eq!(graph.nodata_outlets(), &[(1, 0)]);
    }

    #[test]
    fn test_cycle_is_structural_error() {
        // (0,0) E→(0,1), (0,1) W→(0,0)
        let flow = flow_from(vec![1, 5, 7, 7], 2, 2);
        let mask = mask_from(&[(0, 0), (0, 1)], 2, 2);
        assert!(matches!(
            PixelGraph::new(&flow, &mask),
            Err(Error::FlowCycle { row: 0, .. })
        ));
    }

    #[test]
    fn test_mask_shape_mismatch() {
        let flow = flow_from(vec![7, 7, 7, 7], 2, 2);
        let mask = mask_from(&[], 3, 2);
        assert!(matches!(
            PixelGraph::new(&flow, &mask),
            Err(Error::SizeMismatch { .. })
        ));
    }
}
