use crate::coord::ChunkCoord;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by grid and chunk storage.
///
/// `Exhausted` is the recoverable memory-pressure signal: it is caught by the
/// swapping layer's retry protocol and never reaches callers of the public
/// API. The remaining variants are genuine failures.
#[derive(Debug, Error)]
pub enum GridError {
    /// Fast memory could not cover the requested allocation.
    #[error("out of fast memory: requested {requested} bytes, {free} free")]
    Exhausted { requested: usize, free: usize },

    /// A chunk coordinate outside the grid's chunk lattice.
    #[error("chunk {coord} outside the {rows}x{cols} chunk lattice")]
    OffLattice {
        coord: ChunkCoord,
        rows: u32,
        cols: u32,
    },

    /// A chunk file on disk disagrees with the expected geometry or format.
    #[error("corrupt chunk file {}: {detail}", path.display())]
    CorruptChunk { path: PathBuf, detail: String },

    /// Underlying I/O failure while evicting or reloading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The grid metadata header could not be read or written.
    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl GridError {
    /// Whether this error is the recoverable memory-pressure signal.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, GridError::Exhausted { .. })
    }
}
