//! Segment extraction
//!
//! Walks the pixel forest downstream from every head pixel. A run ends
//! when the next pixel is a confluence, when the current pixel is an
//! outlet, or when owning the next pixel would push the run's coordinate
//! path (the step out of its last pixel included) past the maximum length.
//! A single pixel is always owned, even when one step exceeds the limit.
//! Confluence and split pixels start new runs, so every in-network pixel
//! is owned by exactly one segment.

use std::collections::VecDeque;

use streamnet_core::raster::Raster;
use streamnet_core::{Algorithm, Error, LinearUnits, Result, UnitService};
use tracing::{debug, info};

use super::basins::BasinCache;
use super::pixel_graph::PixelGraph;
use super::topology::Topology;
use super::{LengthUnits, Network, NetworkParams};
use crate::flow::FlowGrid;

/// Segment-network builder
#[derive(Debug, Clone, Default)]
pub struct SegmentBuilder;

impl Algorithm for SegmentBuilder {
    type Input = (FlowGrid, Raster<u8>);
    type Output = Network;
    type Params = NetworkParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Stream Segments"
    }

    fn description(&self) -> &'static str {
        "Split a delineated D8 drainage network into stream segments"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (flow, mask) = input;
        build_network(flow, &mask, &params)
    }
}

/// Build a stream-segment network, converting lengths with [`LinearUnits`].
///
/// # Arguments
/// * `flow` - D8 flow directions (TauDEM encoding)
/// * `mask` - In-network pixels (non-zero), same shape as `flow`
/// * `params` - Maximum segment length and its units
///
/// # Returns
/// The network. An empty mask yields an empty (valid) network.
pub fn build_network(flow: FlowGrid, mask: &Raster<u8>, params: &NetworkParams) -> Result<Network> {
    build_network_with(flow, mask, params, &LinearUnits)
}

/// Build a stream-segment network using a caller-supplied unit service
pub fn build_network_with(
    flow: FlowGrid,
    mask: &Raster<u8>,
    params: &NetworkParams,
    units: &dyn UnitService,
) -> Result<Network> {
    let max_length = max_length_in_base_units(&flow, params, units)?;
    let graph = PixelGraph::new(&flow, mask)?;

    let n = flow.len();
    let mut network = Network {
        flow,
        segments: Vec::new(),
        topology: Topology::default(),
        owner: vec![0; n],
        basins: BasinCache::default(),
        nodata_outlets: graph.nodata_outlets().to_vec(),
    };

    if graph.is_empty() {
        info!("delineation mask has no in-network pixels; network is empty");
        return Ok(network);
    }

    // Pixels that start a segment, in discovery order
    let mut started = vec![false; n];
    let mut queue: VecDeque<usize> = graph.heads().collect();
    for &idx in &queue {
        started[idx] = true;
    }

    while let Some(start) = queue.pop_front() {
        let mut run = vec![network.flow.coords(start)];
        let mut length = 0.0;
        let mut current = start;

        let junction = loop {
            let Some(next) = graph.downstream(current) else {
                break None;
            };
            let (row, col) = network.flow.coords(current);
            let step = network.flow.step_length(row, col).unwrap_or(0.0);
            // Owning `next` also commits the run to the step out of it
            let beyond = match graph.downstream(next) {
                Some(_) => {
                    let (nr, nc) = network.flow.coords(next);
                    network.flow.step_length(nr, nc).unwrap_or(0.0)
                }
                None => 0.0,
            };
            let split = max_length.is_some_and(|max| length + step + beyond > max);

            if graph.is_confluence(next) || split {
                if !started[next] {
                    started[next] = true;
                    queue.push_back(next);
                }
                break Some(network.flow.coords(next));
            }
            length += step;
            run.push(network.flow.coords(next));
            current = next;
        };
        network.push_segment(run, junction);
    }

    network.topology = Topology::build(&network);
    info!(
        segments = network.len(),
        pixels = graph.len(),
        terminals = network.terminal_ids().len(),
        "built stream-segment network"
    );
    Ok(network)
}

fn max_length_in_base_units(
    flow: &FlowGrid,
    params: &NetworkParams,
    units: &dyn UnitService,
) -> Result<Option<f64>> {
    let Some(max_length) = params.max_length else {
        return Ok(None);
    };
    if !(max_length > 0.0) {
        return Err(Error::InvalidParameter {
            name: "max_length",
            value: max_length.to_string(),
            reason: "must be positive".into(),
        });
    }
    let converted = match params.units {
        LengthUnits::Base => max_length,
        LengthUnits::Meters => {
            let crs = flow.crs().ok_or(Error::MissingCrs {
                operation: "convert max_length from meters",
            })?;
            let (_, min_y, _, max_y) = flow.transform().bounds(flow.rows(), flow.cols());
            units.meters_to_base(crs, (min_y + max_y) / 2.0, max_length)?
        }
    };
    debug!(max_length, converted, units = ?params.units, "segment length limit");
    Ok(Some(converted))
}
