//! Stream-segment networks
//!
//! A [`Network`] is built once from a [`FlowGrid`] and an in-network pixel
//! mask, and afterwards only changes through [`Network::keep`] and
//! [`Network::remove`].
//!
//! Segments live in an arena indexed by their ID. Removing a segment
//! tombstones its slot, so IDs are never reused and cross-references held
//! by callers stay meaningful.
//!
//! Each segment *owns* an ordered run of pixels. Its *coordinates* are the
//! owned pixels followed by the junction pixel it drains into (the first
//! pixel of its child) when it has one. The *outlet* is the last owned
//! pixel, so outlets are unique while junctions are shared by the
//! segments meeting at a confluence.

mod basins;
mod builder;
mod filter;
mod pixel_graph;
mod topology;

use serde::{Deserialize, Serialize};
use std::fmt;
use streamnet_core::{Error, GeoTransform, Result};

use crate::flow::FlowGrid;

pub use basins::{BasinBatch, BasinFailure, Catchment, ExecutionMode};
pub use builder::{build_network, build_network_with, SegmentBuilder};
pub use filter::{ContinuityParams, RemovalReport, Selection, SelectionOutcome};
pub use pixel_graph::PixelGraph;

use basins::BasinCache;
use topology::Topology;

/// Stable segment identifier. IDs start at 1 and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub u32);

impl SegmentId {
    fn slot(self) -> usize {
        self.0.wrapping_sub(1) as usize
    }

    fn from_slot(slot: usize) -> Self {
        SegmentId(slot as u32 + 1)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Units of [`NetworkParams::max_length`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthUnits {
    /// Meters, converted through a [`streamnet_core::UnitService`]
    #[default]
    Meters,
    /// The CRS's base units (no conversion)
    Base,
}

/// Parameters for building a network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Maximum owned path length of a segment. Longer runs are split.
    /// `None` disables splitting. Default: `None`
    pub max_length: Option<f64>,
    /// Units of `max_length`. Default: meters
    pub units: LengthUnits,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            max_length: None,
            units: LengthUnits::Meters,
        }
    }
}

/// One stream segment
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    id: SegmentId,
    pixels: Vec<(usize, usize)>,
    junction: Option<(usize, usize)>,
    length: f64,
}

impl Segment {
    /// Segment ID
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Owned pixels as (row, col), upstream to downstream
    pub fn pixels(&self) -> &[(usize, usize)] {
        &self.pixels
    }

    /// Number of owned pixels
    pub fn npixels(&self) -> usize {
        self.pixels.len()
    }

    /// First owned pixel: the flow source of the segment
    pub fn source(&self) -> (usize, usize) {
        self.pixels[0]
    }

    /// Last owned pixel
    pub fn outlet(&self) -> (usize, usize) {
        self.pixels[self.pixels.len() - 1]
    }

    /// The pixel this segment drains into, when that pixel starts another
    /// live segment (a confluence or a length split). Cleared when that
    /// segment is removed.
    pub fn junction(&self) -> Option<(usize, usize)> {
        self.junction
    }

    /// Ordered coordinates: owned pixels, then the junction if any
    pub fn coordinates(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.pixels.iter().copied().chain(self.junction)
    }

    /// Length of the coordinate path in CRS base units
    pub fn length(&self) -> f64 {
        self.length
    }
}

/// A stream-segment network and its derived topology
#[derive(Debug, Clone)]
pub struct Network {
    flow: FlowGrid,
    segments: Vec<Option<Segment>>,
    topology: Topology,
    /// Segment owning each pixel (0 = none), indexed by flat pixel index
    owner: Vec<u32>,
    basins: BasinCache,
    nodata_outlets: Vec<(usize, usize)>,
}

impl Network {
    /// The flow-direction grid the network was built from
    pub fn flow(&self) -> &FlowGrid {
        &self.flow
    }

    /// Number of live segments
    pub fn len(&self) -> usize {
        self.segments.iter().flatten().count()
    }

    /// Whether the network has no segments
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live segment IDs in ascending order
    pub fn ids(&self) -> Vec<SegmentId> {
        self.segments().map(Segment::id).collect()
    }

    /// Live segments in ID order
    pub fn segments(&self) -> impl Iterator<Item = &Segment> + '_ {
        self.segments.iter().flatten()
    }

    /// Whether `id` names a live segment
    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments
            .get(id.slot())
            .is_some_and(|slot| slot.is_some())
    }

    /// Look up a live segment
    pub fn segment(&self, id: SegmentId) -> Result<&Segment> {
        self.segments
            .get(id.slot())
            .and_then(Option::as_ref)
            .ok_or(Error::SegmentNotFound(id.0))
    }

    /// The live segment owning pixel (row, col), if any
    pub fn segment_at(&self, row: usize, col: usize) -> Option<SegmentId> {
        if row >= self.flow.rows() || col >= self.flow.cols() {
            return None;
        }
        match self.owner[self.flow.index(row, col)] {
            0 => None,
            id => Some(SegmentId(id)),
        }
    }

    /// Outlet pixel of a segment
    pub fn outlet(&self, id: SegmentId) -> Result<(usize, usize)> {
        Ok(self.segment(id)?.outlet())
    }

    /// Outlet pixel of the terminal segment of `id`'s local network
    pub fn terminal_outlet(&self, id: SegmentId) -> Result<(usize, usize)> {
        self.outlet(self.terminal_of(id)?)
    }

    /// Segment lengths in CRS base units, in ID order
    pub fn lengths(&self) -> Vec<f64> {
        self.segments().map(Segment::length).collect()
    }

    /// Pixels whose NoData flow direction ended a segment during building
    pub fn nodata_outlets(&self) -> &[(usize, usize)] {
        &self.nodata_outlets
    }

    fn push_segment(&mut self, pixels: Vec<(usize, usize)>, junction: Option<(usize, usize)>) -> SegmentId {
        let id = SegmentId::from_slot(self.segments.len());
        let length = path_length(self.flow.transform(), pixels.iter().copied().chain(junction));
        for &(row, col) in &pixels {
            let idx = self.flow.index(row, col);
            self.owner[idx] = id.0;
        }
        self.segments.push(Some(Segment {
            id,
            pixels,
            junction,
            length,
        }));
        self.topology.push();
        id
    }

    /// Drop the junction of a segment whose child was removed, so its
    /// coordinates end at its own outlet
    fn clear_junction(&mut self, id: SegmentId) {
        let transform = *self.flow.transform();
        if let Some(Some(segment)) = self.segments.get_mut(id.slot()) {
            if segment.junction.take().is_some() {
                segment.length = path_length(&transform, segment.pixels.iter().copied());
            }
        }
    }
}

/// Length of a pixel path between consecutive pixel centers
fn path_length(transform: &GeoTransform, path: impl Iterator<Item = (usize, usize)>) -> f64 {
    let path: Vec<_> = path.collect();
    path.windows(2)
        .map(|pair| {
            let (r0, c0) = pair[0];
            let (r1, c1) = pair[1];
            transform.step_length(r1 as isize - r0 as isize, c1 as isize - c0 as isize)
        })
        .sum()
}


#[cfg(test)]
mod tests {
    use super::test_grids::*;
    use super::*;

    #[test]
    fn test_segment_accessors() {
        let net = confluence();
        let seg = net.segment(SegmentId(1)).unwrap();
        assert_eq!(seg.source(), (0, 0));
        assert_eq!(seg.outlet(), (1, 1));
        assert_eq!(seg.junction(), Some((2, 2)));
        assert_eq!(seg.coordinates().collect::<Vec<_>>(), vec![(0, 0), (1, 1), (2, 2)]);
        approx::assert_relative_eq!(seg.length(), 2.0 * 10.0 * std::f64::consts::SQRT_2);
    }

    #[test]
    fn test_segment_at_and_not_found() {
        let net = confluence();
        assert_eq!(net.segment_at(3, 2), Some(SegmentId(3)));
        assert_eq!(net.segment_at(0, 1), None);
        assert_eq!(net.segment_at(9, 9), None);
        assert!(matches!(net.segment(SegmentId(4)), Err(Error::SegmentNotFound(4))));
        assert!(matches!(net.segment(SegmentId(0)), Err(Error::SegmentNotFound(0))));
    }

    #[test]
    fn test_terminal_outlet() {
        let net = confluence();
        assert_eq!(net.terminal_outlet(SegmentId(1)).unwrap(), (4, 2));
        assert_eq!(net.outlet(SegmentId(2)).unwrap(), (1, 3));
    }
}
