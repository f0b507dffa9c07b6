//! Chunk-addressed raster grid storage for GridSwap.
//!
//! Grids too large for fast memory are partitioned into rectangular chunks.
//! This crate provides the storage half of the system: chunk keys and
//! coordinate mapping, swappable chunks with pluggable cell encodings, the
//! on-disk chunk codec, the byte-accounted fast-memory ledger, and the
//! [`Grid`] type that resolves cell coordinates to chunks and loads them on
//! demand. The eviction policy and the memory-pressure retry protocol live in
//! `gridswap-memory`.

pub mod chunk;
pub mod coord;
pub mod dimensions;
pub mod error;
pub mod grid;
pub mod pool;
pub mod stats;
pub mod store;

pub use chunk::{same_value, CellStore, Chunk, DenseStore, SparseStore};
pub use coord::{to_global, to_local, ChunkCoord, ChunkId, GridId};
pub use dimensions::GridDimensions;
pub use error::GridError;
pub use grid::{Grid, GridSpec, DEFAULT_CHUNK_SIZE, DEFAULT_NO_DATA};
pub use pool::{FastMemory, PoolHandle};
pub use stats::{CellObserver, ObserverHandle, RunningStats};
