//! Error types for streamnet

use thiserror::Error;

/// Main error type for streamnet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch for {name}: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch {
        name: String,
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("Flow-direction raster contains no valid D8 codes")]
    EmptyFlowDirections,

    #[error("Flow directions form a cycle through pixel ({row}, {col})")]
    FlowCycle { row: usize, col: usize },

    #[error("A CRS is required to {operation}")]
    MissingCrs { operation: &'static str },

    #[error("Unsupported linear unit: {0}")]
    UnsupportedUnit(String),

    #[error("No segment with ID {0}")]
    SegmentNotFound(u32),

    #[error("Selection mask has {actual} elements, but the network has {expected} segments")]
    SelectionLength { expected: usize, actual: usize },

    #[error("Property {name} has {actual} values, but {expected} features are being exported")]
    PropertyLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Algorithm error: {0}")]
    Algorithm(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for streamnet operations
pub type Result<T> = std::result::Result<T, Error>;
