//! Catchment basins
//!
//! A catchment is every grid pixel whose D8 path reaches a segment's outlet,
//! found by breadth-first traversal upstream over the full flow grid.
//! Terminal outlet basins can be located in one batch, sequentially or on a
//! fixed-size rayon pool, and are cached on the network until the next
//! removal.

use std::collections::{BTreeMap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use streamnet_core::{Error, Result};
use tracing::{debug, info, warn};

use super::{Network, SegmentId};
use crate::flow::FlowGrid;

/// How a batch of independent traversals is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExecutionMode {
    /// Single-threaded, in terminal ID order
    #[default]
    Sequential,
    /// A dedicated thread pool with the given number of workers
    Parallel { threads: usize },
}

/// Pixels draining to one outlet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catchment {
    shape: (usize, usize),
    outlet: (usize, usize),
    /// Sorted row-major flat indices
    pixels: Vec<usize>,
}

impl Catchment {
    /// Upstream traversal from `outlet`.
    ///
    /// In a D8 grid every pixel has one downstream neighbor, so no pixel is
    /// reached twice unless it lies on a cycle through the outlet itself;
    /// skipping the outlet is enough to terminate.
    pub(crate) fn upstream_of(flow: &FlowGrid, outlet: (usize, usize)) -> Self {
        let seed = flow.index(outlet.0, outlet.1);
        let mut pixels = vec![seed];
        let mut queue = VecDeque::from([seed]);
        let mut upstream = Vec::with_capacity(8);
        while let Some(idx) = queue.pop_front() {
            upstream.clear();
            flow.upstream_indices(idx, &mut upstream);
            for &up in upstream.iter().filter(|&&up| up != seed) {
                pixels.push(up);
                queue.push_back(up);
            }
        }
        pixels.sort_unstable();
        Self {
            shape: flow.shape(),
            outlet,
            pixels,
        }
    }

    /// Grid dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// The pixel the catchment drains to
    pub fn outlet(&self) -> (usize, usize) {
        self.outlet
    }

    /// Number of pixels, outlet included
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Always false: a catchment holds at least its outlet
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Sorted row-major flat indices
    pub fn pixels(&self) -> &[usize] {
        &self.pixels
    }

    /// Pixels as (row, col), in row-major order
    pub fn coords(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        let cols = self.shape.1;
        self.pixels.iter().map(move |&idx| (idx / cols, idx % cols))
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.shape.0
            && col < self.shape.1
            && self.pixels.binary_search(&(row * self.shape.1 + col)).is_ok()
    }

    /// Boolean mask over the grid
    pub fn mask(&self) -> Array2<bool> {
        let mut mask = Array2::from_elem(self.shape, false);
        for (row, col) in self.coords() {
            mask[[row, col]] = true;
        }
        mask
    }
}

/// A terminal whose basin could not be located
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasinFailure {
    pub terminal: SegmentId,
    pub message: String,
}

/// Outcome of [`Network::locate_basins`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasinBatch {
    /// Terminals whose basins are now cached, ascending
    pub located: Vec<SegmentId>,
    pub failures: Vec<BasinFailure>,
}

impl BasinBatch {
    /// Whether every terminal was located
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Terminal basins keyed by terminal ID. `None` until located.
#[derive(Debug, Clone, Default)]
pub(super) struct BasinCache {
    located: Option<BTreeMap<SegmentId, Arc<Catchment>>>,
}

impl BasinCache {
    pub(super) fn get(&self, terminal: SegmentId) -> Option<Arc<Catchment>> {
        self.located.as_ref()?.get(&terminal).cloned()
    }

    pub(super) fn is_located(&self) -> bool {
        self.located.is_some()
    }

    fn store(&mut self, basins: BTreeMap<SegmentId, Arc<Catchment>>) {
        self.located = Some(basins);
    }

    pub(super) fn invalidate(&mut self) {
        if self.located.take().is_some() {
            debug!("discarded located basins");
        }
    }
}

/// Run `work` once per key, sequentially or on a dedicated pool.
///
/// Results come back in key order whatever the mode. An error or a panic
/// inside `work` becomes that key's `Err(message)`; the other keys still
/// run.
pub(crate) fn run_batch<K, T, F>(
    keys: &[K],
    mode: ExecutionMode,
    work: F,
) -> Result<Vec<(K, std::result::Result<T, String>)>>
where
    K: Copy + Send + Sync,
    T: Send,
    F: Fn(K) -> Result<T> + Send + Sync,
{
    let guarded = |key: K| {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| work(key))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err.to_string()),
            Err(payload) => Err(panic_message(payload.as_ref())),
        };
        (key, outcome)
    };

    match mode {
        ExecutionMode::Sequential => Ok(keys.iter().map(|&key| guarded(key)).collect()),
        ExecutionMode::Parallel { threads: 0 } => Err(Error::InvalidParameter {
            name: "threads",
            value: "0".into(),
            reason: "a parallel batch needs at least one worker".into(),
        }),
        #[cfg(feature = "parallel")]
        ExecutionMode::Parallel { threads } => {
            use rayon::prelude::*;

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|e| Error::Algorithm(format!("failed to build thread pool: {}", e)))?;
            Ok(pool.install(|| keys.par_iter().map(|&key| guarded(key)).collect()))
        }
        #[cfg(not(feature = "parallel"))]
        ExecutionMode::Parallel { threads } => {
            debug!(threads, "built without the `parallel` feature; running sequentially");
            Ok(keys.iter().map(|&key| guarded(key)).collect())
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

impl Network {
    /// Catchment of a segment's outlet
    pub fn catchment(&self, id: SegmentId) -> Result<Arc<Catchment>> {
        let outlet = self.outlet(id)?;
        if let Some(cached) = self.basins.get(id) {
            return Ok(cached);
        }
        Ok(Arc::new(Catchment::upstream_of(&self.flow, outlet)))
    }

    /// Catchment of a segment's outlet as a boolean mask over the grid
    pub fn catchment_mask(&self, id: SegmentId) -> Result<Array2<bool>> {
        Ok(self.catchment(id)?.mask())
    }

    /// Terminal outlet basin of `id`'s local network.
    ///
    /// Served from the cache after [`Network::locate_basins`], computed on
    /// demand otherwise.
    pub fn basin(&self, id: SegmentId) -> Result<Arc<Catchment>> {
        let terminal = self.terminal_of(id)?;
        self.catchment(terminal)
    }

    /// Whether terminal basins are currently cached
    pub fn basins_located(&self) -> bool {
        self.basins.is_located()
    }

    /// Locate and cache the terminal outlet basin of every local network.
    ///
    /// Fails only on an invalid mode; per-terminal failures are collected in
    /// the returned batch and leave the other basins unaffected.
    pub fn locate_basins(&mut self, mode: ExecutionMode) -> Result<BasinBatch> {
        let jobs = self
            .terminal_ids()
            .into_iter()
            .map(|id| self.outlet(id).map(|outlet| (id, outlet)))
            .collect::<Result<Vec<_>>>()?;

        let flow = &self.flow;
        let results = run_batch(&jobs, mode, |(_, outlet)| Ok(Catchment::upstream_of(flow, outlet)))?;

        let mut located = BTreeMap::new();
        let mut failures = Vec::new();
        for ((terminal, _), result) in results {
            match result {
                Ok(catchment) => {
                    located.insert(terminal, Arc::new(catchment));
                }
                Err(message) => {
                    warn!(%terminal, %message, "failed to locate terminal basin");
                    failures.push(BasinFailure { terminal, message });
                }
            }
        }

        info!(
            located = located.len(),
            failed = failures.len(),
            ?mode,
            "located terminal outlet basins"
        );
        let batch = BasinBatch {
            located: located.keys().copied().collect(),
            failures,
        };
        self.basins.store(located);
        Ok(batch)
    }

    /// Drop any cached basins
    pub fn clear_basins(&mut self) {
        self.basins.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_grids::*;
    use super::super::Selection;
    use super::*;

    #[test]
    fn test_confluence_catchments() {
        let net = confluence();
        assert_eq!(net.catchment(SegmentId(1)).unwrap().len(), 4);
        assert_eq!(net.catchment(SegmentId(2)).unwrap().len(), 4);
        assert_eq!(net.catchment(SegmentId(3)).unwrap().len(), 25);

        let head = net.catchment(SegmentId(1)).unwrap();
        let coords: Vec<_> = head.coords().collect();
        assert_eq!(coords, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert!(head.contains(1, 1));
        assert!(!head.contains(2, 2));
        assert_eq!(head.outlet(), (1, 1));
    }

    #[test]
    fn test_catchment_mask() {
        let net = confluence();
        let mask = net.catchment_mask(SegmentId(2)).unwrap();
        assert_eq!(mask.dim(), (5, 5));
        assert_eq!(mask.iter().filter(|&&v| v).count(), 4);
        assert!(mask[[0, 4]]);
        assert!(!mask[[0, 0]]);
    }

    #[test]
    fn test_catchments_grow_downstream() {
        let net = two_networks();
        for segment in net.segments() {
            let child = net.catchment(segment.id()).unwrap();
            for &(row, col) in segment.pixels() {
                assert!(child.contains(row, col));
            }
            for &parent in net.parents(segment.id()).unwrap() {
                let parent = net.catchment(parent).unwrap();
                assert!(parent.coords().all(|(r, c)| child.contains(r, c)));
            }
        }
    }

    #[test]
    fn test_parent_catchments_do_not_overlap() {
        let net = confluence();
        let trunk = net.catchment(SegmentId(3)).unwrap();
        let parents = net.parents(SegmentId(3)).unwrap();
        let a = net.catchment(parents[0]).unwrap();
        let b = net.catchment(parents[1]).unwrap();
        assert!(a.coords().all(|(r, c)| !b.contains(r, c)));

        let own = trunk
            .coords()
            .filter(|&(r, c)| !a.contains(r, c) && !b.contains(r, c))
            .count();
        assert_eq!(a.len() + b.len() + own, trunk.len());
    }

    #[test]
    fn test_locate_sequential_matches_parallel() {
        let mut sequential = two_networks();
        let mut parallel = sequential.clone();
        let a = sequential.locate_basins(ExecutionMode::Sequential).unwrap();
        let b = parallel
            .locate_basins(ExecutionMode::Parallel { threads: 3 })
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.located, vec![SegmentId(3), SegmentId(6)]);
        assert!(a.is_complete());
        for terminal in a.located {
            assert_eq!(
                sequential.basin(terminal).unwrap(),
                parallel.basin(terminal).unwrap()
            );
        }
    }

    #[test]
    fn test_basin_of_member_is_terminal_basin() {
        let mut net = two_networks();
        net.locate_basins(ExecutionMode::Sequential).unwrap();
        let basin = net.basin(SegmentId(1)).unwrap();
        assert_eq!(basin, net.catchment(SegmentId(6)).unwrap());
        assert_eq!(basin.outlet(), (6, 2));
    }

    #[test]
    fn test_zero_threads_is_invalid() {
        let mut net = confluence();
        assert!(matches!(
            net.locate_basins(ExecutionMode::Parallel { threads: 0 }),
            Err(Error::InvalidParameter { name: "threads", .. })
        ));
        assert!(!net.basins_located());
    }

    #[test]
    fn test_batch_failures_are_per_key() {
        let keys = [1_u32, 2, 3, 4];
        for mode in [ExecutionMode::Sequential, ExecutionMode::Parallel { threads: 2 }] {
            let results = run_batch(&keys, mode, |key| match key {
                2 => Err(Error::Other("bad outlet".into())),
                3 => panic!("worker blew up"),
                _ => Ok(key * 10),
            })
            .unwrap();

            assert_eq!(results.len(), 4);
            assert_eq!(results[0], (1, Ok(10)));
            assert_eq!(results[1], (2, Err("bad outlet".to_string())));
            assert_eq!(results[2], (3, Err("worker blew up".to_string())));
            assert_eq!(results[3], (4, Ok(40)));
        }
    }

    #[test]
    fn test_removal_invalidates_cache() {
        let mut net = two_networks();
        net.locate_basins(ExecutionMode::Sequential).unwrap();
        assert!(net.basins_located());

        net.remove(&Selection::Ids(vec![SegmentId(6)])).unwrap();
        assert!(!net.basins_located());
        // Segment 5 is now a terminal; its basin is computed on demand
        assert_eq!(net.basin(SegmentId(1)).unwrap().outlet(), (4, 2));

        net.locate_basins(ExecutionMode::Sequential).unwrap();
        net.clear_basins();
        assert!(!net.basins_located());
    }
}
