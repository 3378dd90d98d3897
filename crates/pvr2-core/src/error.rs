//! Error types for pvr2-rs frame data.

use thiserror::Error;

/// Errors raised while validating or loading a captured frame.
#[derive(Error, Debug)]
pub enum FrameError {
    /// A render pass has a cumulative count lower than the pass before it.
    #[error("render pass {pass}: {field} count went from {previous} to {current}")]
    PassCountDecreased {
        pass: usize,
        field: &'static str,
        previous: u32,
        current: u32,
    },

    /// A render pass refers to more records than the list holds.
    #[error("render pass {pass}: {field} count {count} exceeds list length {len}")]
    PassCountOutOfRange {
        pass: usize,
        field: &'static str,
        count: u32,
        len: usize,
    },

    /// A polygon record's strip extends past the index buffer.
    #[error("{list} record {index}: indices {first}..{end} exceed index buffer of {len}")]
    IndexSpanOutOfRange {
        list: &'static str,
        index: usize,
        first: u32,
        end: u64,
        len: usize,
    },

    /// A strip index refers to a vertex that does not exist.
    #[error("index {position} refers to vertex {vertex}, only {len} vertices present")]
    VertexOutOfRange {
        position: usize,
        vertex: u32,
        len: usize,
    },

    /// A modifier volume record extends past the modifier volume triangles.
    #[error("{list} modifier volume {index}: triangles {first}..{end} exceed {len} triangles")]
    ModifierVolumeOutOfRange {
        list: &'static str,
        index: usize,
        first: u32,
        end: u64,
        len: usize,
    },

    /// The modifier volume position buffer is not made of whole triangles.
    #[error("modifier volume buffer holds {0} vertices, not a multiple of 3")]
    PartialModifierTriangle(usize),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized Result type for frame operations.
pub type Result<T> = std::result::Result<T, FrameError>;
