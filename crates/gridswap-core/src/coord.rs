//! Chunk addressing: grid handles, chunk coordinates, and the mapping between
//! global cell coordinates and (chunk, local) pairs.
//!
//! Unlike a fixed-size block scheme, every grid carries its own nominal chunk
//! geometry, so the conversion helpers take the chunk size as a parameter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle identifying a registered grid.
///
/// Handed out by the environment at registration time; ordering follows
/// registration order, which keeps eviction sweeps deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridId(pub u64);

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid#{}", self.0)
    }
}

/// Coordinate of a chunk within one grid's chunk lattice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoord {
    /// Which block of rows (row / chunk_rows)
    pub chunk_row: u32,
    /// Which block of columns (col / chunk_cols)
    pub chunk_col: u32,
}

impl ChunkCoord {
    pub const fn new(chunk_row: u32, chunk_col: u32) -> Self {
        ChunkCoord { chunk_row, chunk_col }
    }

    /// Create a ChunkCoord from a cell's global coordinates.
    ///
    /// # Examples
    ///
    /// ```
    /// use gridswap_core::ChunkCoord;
    ///
    /// let coord = ChunkCoord::from_cell(17, 33, 16, 16);
    /// assert_eq!(coord.chunk_row, 1);
    /// assert_eq!(coord.chunk_col, 2);
    /// ```
    pub fn from_cell(row: u64, col: u64, chunk_rows: usize, chunk_cols: usize) -> Self {
        Self {
            chunk_row: (row / chunk_rows as u64) as u32,
            chunk_col: (col / chunk_cols as u64) as u32,
        }
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.chunk_row, self.chunk_col)
    }
}

/// Globally unique chunk key: which chunk of which grid.
///
/// Used as the key of protected sets and eviction reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId {
    pub grid: GridId,
    pub coord: ChunkCoord,
}

impl ChunkId {
    pub const fn new(grid: GridId, coord: ChunkCoord) -> Self {
        ChunkId { grid, coord }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.grid, self.coord)
    }
}

/// Convert global coordinates to local coordinates within a chunk.
pub fn to_local(row: u64, col: u64, chunk_rows: usize, chunk_cols: usize) -> (usize, usize) {
    (
        (row % chunk_rows as u64) as usize,
        (col % chunk_cols as u64) as usize,
    )
}

/// Convert a chunk coordinate and local coordinates back to global coordinates.
pub fn to_global(
    coord: ChunkCoord,
    local_row: usize,
    local_col: usize,
    chunk_rows: usize,
    chunk_cols: usize,
) -> (u64, u64) {
    (
        coord.chunk_row as u64 * chunk_rows as u64 + local_row as u64,
        coord.chunk_col as u64 * chunk_cols as u64 + local_col as u64,
    )
}
