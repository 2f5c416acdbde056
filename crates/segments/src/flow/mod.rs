//! Flow-routing inputs
//!
//! - [`FlowGrid`]: read-only D8 flow directions (TauDEM encoding)
//! - [`delineation_mask`]: in-network pixels from accumulation thresholds
//! - [`catchment_sizes`]: catchment pixel counts for every pixel

mod accumulation;
mod delineate;
mod grid;

pub use accumulation::catchment_sizes;
pub use delineate::{delineation_mask, Delineation, DelineationInput, DelineationParams};
pub use grid::{opposite_dir, DirectionEncoding, FlowGrid, D8_OFFSETS};
