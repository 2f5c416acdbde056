//! # streamnet Segments
//!
//! Stream-segment networks for post-fire debris-flow assessment.
//!
//! ## Pipeline
//!
//! - **flow**: D8 flow directions, delineation masks, catchment sizes
//! - **network**: segment building, topology, continuity filtering, basins
//! - **variables**: per-segment statistics and named model inputs
//! - **export**: vector features and GeoJSON
//!
//! ```no_run
//! use streamnet_segments::prelude::*;
//!
//! # fn run(directions: Raster<u8>, accumulation: Raster<f64>) -> Result<()> {
//! let flow = FlowGrid::from_taudem(&directions)?;
//! let mask = delineation_mask(&accumulation, None, &DelineationParams::default())?;
//! let mut network = build_network(flow, &mask, &NetworkParams::default())?;
//! network.locate_basins(ExecutionMode::Parallel { threads: 4 })?;
//! let outlets = network.features(ExportKind::Outlets, &PropertyTable::new(), &ExportOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod export;
pub mod flow;
pub mod network;
pub mod variables;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::export::geojson::{to_geojson, to_geojson_string};
    pub use crate::export::{
        Column, ExportKind, ExportOptions, PixelOutline, Polygonize, PropertyTable, Reproject,
    };
    pub use crate::flow::{
        catchment_sizes, delineation_mask, Delineation, DelineationParams, DirectionEncoding,
        FlowGrid,
    };
    pub use crate::network::{
        build_network, build_network_with, BasinBatch, BasinFailure, Catchment, ContinuityParams,
        ExecutionMode, LengthUnits, Network, NetworkParams, RemovalReport, Segment,
        SegmentBuilder, SegmentId, Selection, SelectionOutcome,
    };
    pub use crate::variables::{ConfinementParams, Scope, Statistic, UnitFactors};
    pub use streamnet_core::prelude::*;
}
