//! Catchment pixel counts
//!
//! Counts, for every pixel, how many pixels drain through it (itself
//! included) by propagating counts downstream in topological order.
//! A single pass gives the catchment size of every segment outlet without
//! delineating each catchment.

use ndarray::Array2;

use super::FlowGrid;

/// Number of pixels in the catchment of every pixel, itself included.
///
/// Pixels trapped in a flow-direction cycle never become ready and keep
/// a partial count.
pub fn catchment_sizes(flow: &FlowGrid) -> Array2<u64> {
    let (rows, cols) = flow.shape();
    let n = rows * cols;

    // Step 1: in-degree of every pixel
    let mut in_degree = vec![0_u32; n];
    for idx in 0..n {
        if let Some(down) = flow.downstream_index(idx) {
            in_degree[down] += 1;
        }
    }

    // Step 2: headwater pixels start the queue
    let mut sizes = vec![1_u64; n];
    let mut queue: Vec<usize> = (0..n).filter(|&idx| in_degree[idx] == 0).collect();

    // Step 3: each pixel hands its count to its downstream pixel
    while let Some(idx) = queue.pop() {
        let Some(down) = flow.downstream_index(idx) else {
            continue;
        };
        sizes[down] += sizes[idx];
        in_degree[down] -= 1;
        if in_degree[down] == 0 {
            queue.push(down);
        }
    }

    Array2::from_shape_fn((rows, cols), |(row, col)| sizes[row * cols + col])
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamnet_core::Raster;

    #[test]
    fn test_catchment_sizes_linear() {
        // 1x5 strip draining east: sizes grow by one per pixel
        let flow = FlowGrid::from_taudem(&Raster::filled(1, 5, 1_u8)).unwrap();
        let sizes = catchment_sizes(&flow);
        assert_eq!(sizes.row(0).to_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_catchment_sizes_convergent() {
        // All eight neighbors drain into the center, which drains south off-grid
        let codes = vec![8_u8, 7, 6, 1, 7, 5, 2, 3, 4];
        let mut flow_raster = Raster::from_vec(codes, 3, 3).unwrap();
        flow_raster.set(2, 1, 7).unwrap();
        let flow = FlowGrid::from_taudem(&flow_raster).unwrap();
        let sizes = catchment_sizes(&flow);
        // (2,1) no longer drains back into the center
        assert_eq!(sizes[(1, 1)], 8);
        assert_eq!(sizes[(2, 1)], 9);
    }
}
