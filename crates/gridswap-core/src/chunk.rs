//! Swappable chunks and their in-memory cell encodings.
//!
//! A [`Chunk`] is the unit of eviction: it is either `Resident` (values held
//! in a [`CellStore`]) or `Evicted` (values persisted to its backing file).
//! Chunks are purely the unit of storage; they never evict other chunks and
//! know nothing about the global memory policy.
//!
//! Two encodings implement [`CellStore`]:
//! - [`SparseStore`]: a local-coordinate map with an implicit fill value;
//!   the cheap starting representation for mostly-no-data chunks.
//! - [`DenseStore`]: a row-major `Vec<f64>` for well-populated chunks.
//!
//! A sparse store whose footprint grows past the dense footprint is promoted
//! to dense by the owning grid.

use crate::error::GridError;
use crate::store;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Fixed per-store overhead charged against the fast-memory ledger.
pub const STORE_BASE_BYTES: usize = 64;
/// Ledger cost of one occupied sparse entry (key, value, node overhead).
pub const SPARSE_ENTRY_BYTES: usize = 32;
/// Ledger cost of one dense cell.
pub const CELL_BYTES: usize = 8;

/// Ledger footprint of a dense store covering `rows` x `cols` cells.
pub fn dense_cost(rows: usize, cols: usize) -> usize {
    STORE_BASE_BYTES + rows * cols * CELL_BYTES
}

/// Ledger footprint of a sparse store holding `entries` occupied cells.
pub fn sparse_cost(entries: usize) -> usize {
    STORE_BASE_BYTES + entries * SPARSE_ENTRY_BYTES
}

/// Bitwise value equality, so a NaN no-data value compares equal to itself.
pub fn same_value(a: f64, b: f64) -> bool {
    a.to_bits() == b.to_bits()
}

/// In-memory cell storage for one chunk.
///
/// The capability seam between grids and chunk encodings: grid code calls
/// this interface and never inspects the concrete encoding.
pub trait CellStore: fmt::Debug {
    /// Rows covered by this store (trailing chunks may be truncated).
    fn rows(&self) -> usize;
    /// Columns covered by this store.
    fn cols(&self) -> usize;
    /// Value at a local offset.
    fn get(&self, local_row: usize, local_col: usize) -> f64;
    /// Write a value at a local offset, returning the previous value.
    fn set(&mut self, local_row: usize, local_col: usize, value: f64) -> f64;
    /// Extra ledger bytes this `set` would require before it is performed.
    fn growth_for_set(&self, local_row: usize, local_col: usize, value: f64) -> usize;
    /// Current ledger footprint in bytes.
    fn byte_size(&self) -> usize;
    /// Number of cells holding a non-fill value.
    fn occupied(&self) -> usize;
    /// Whether this encoding benefits from promotion to dense once its
    /// footprint exceeds the dense footprint.
    fn is_promotable(&self) -> bool;
}

/// Sparse cell store: local coordinates mapped to values, everything else
/// implicitly the fill (no-data) value.
#[derive(Debug, Clone)]
pub struct SparseStore {
    rows: usize,
    cols: usize,
    fill: f64,
    cells: BTreeMap<(u16, u16), f64>,
}

impl SparseStore {
    pub fn new(rows: usize, cols: usize, fill: f64) -> Self {
        assert!(
            rows <= u16::MAX as usize && cols <= u16::MAX as usize,
            "sparse store dimensions must fit u16 local coordinates"
        );
        Self {
            rows,
            cols,
            fill,
            cells: BTreeMap::new(),
        }
    }

    /// Build a dense copy of this store's contents.
    pub fn to_dense(&self) -> DenseStore {
        let mut dense = DenseStore::filled(self.rows, self.cols, self.fill);
        for (&(lr, lc), &v) in &self.cells {
            dense.set(lr as usize, lc as usize, v);
        }
        dense
    }
}

impl CellStore for SparseStore {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn get(&self, local_row: usize, local_col: usize) -> f64 {
        self.cells
            .get(&(local_row as u16, local_col as u16))
            .copied()
            .unwrap_or(self.fill)
    }

    fn set(&mut self, local_row: usize, local_col: usize, value: f64) -> f64 {
        let key = (local_row as u16, local_col as u16);
        if same_value(value, self.fill) {
            // Writing the fill value removes the entry to keep the map sparse
            self.cells.remove(&key).unwrap_or(self.fill)
        } else {
            self.cells.insert(key, value).unwrap_or(self.fill)
        }
    }

    fn growth_for_set(&self, local_row: usize, local_col: usize, value: f64) -> usize {
        let key = (local_row as u16, local_col as u16);
        if !same_value(value, self.fill) && !self.cells.contains_key(&key) {
            SPARSE_ENTRY_BYTES
        } else {
            0
        }
    }

    fn byte_size(&self) -> usize {
        sparse_cost(self.cells.len())
    }

    fn occupied(&self) -> usize {
        self.cells.len()
    }

    fn is_promotable(&self) -> bool {
        true
    }
}

/// Dense cell store: row-major values for every cell of the chunk.
#[derive(Debug, Clone)]
pub struct DenseStore {
    rows: usize,
    cols: usize,
    fill: f64,
    values: Vec<f64>,
}

impl DenseStore {
    /// A dense store with every cell set to the fill value.
    pub fn filled(rows: usize, cols: usize, fill: f64) -> Self {
        Self {
            rows,
            cols,
            fill,
            values: vec![fill; rows * cols],
        }
    }

    /// A dense store wrapping already-decoded row-major values.
    pub fn from_values(rows: usize, cols: usize, fill: f64, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), rows * cols);
        Self {
            rows,
            cols,
            fill,
            values,
        }
    }
}

impl CellStore for DenseStore {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn get(&self, local_row: usize, local_col: usize) -> f64 {
        self.values[local_row * self.cols + local_col]
    }

    fn set(&mut self, local_row: usize, local_col: usize, value: f64) -> f64 {
        let slot = &mut self.values[local_row * self.cols + local_col];
        std::mem::replace(slot, value)
    }

    fn growth_for_set(&self, _local_row: usize, _local_col: usize, _value: f64) -> usize {
        0
    }

    fn byte_size(&self) -> usize {
        dense_cost(self.rows, self.cols)
    }

    fn occupied(&self) -> usize {
        self.values
            .iter()
            .filter(|v| !same_value(**v, self.fill))
            .count()
    }

    fn is_promotable(&self) -> bool {
        false
    }
}

/// Residency state of a chunk. A chunk is always in exactly one state.
enum ChunkState {
    Resident(Box<dyn CellStore>),
    Evicted,
}

impl fmt::Debug for ChunkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkState::Resident(store) => write!(f, "Resident({} bytes)", store.byte_size()),
            ChunkState::Evicted => write!(f, "Evicted"),
        }
    }
}

/// One rectangular sub-region of a grid's cells, the unit of swap/eviction.
#[derive(Debug)]
pub struct Chunk {
    rows: usize,
    cols: usize,
    no_data: f64,
    state: ChunkState,
}

impl Chunk {
    /// A fresh resident chunk with every cell at no-data (sparse, empty).
    pub fn new_sparse(rows: usize, cols: usize, no_data: f64) -> Self {
        Self {
            rows,
            cols,
            no_data,
            state: ChunkState::Resident(Box::new(SparseStore::new(rows, cols, no_data))),
        }
    }

    /// A chunk known only from its backing file, not yet loaded.
    pub fn evicted(rows: usize, cols: usize, no_data: f64) -> Self {
        Self {
            rows,
            cols,
            no_data,
            state: ChunkState::Evicted,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn no_data(&self) -> f64 {
        self.no_data
    }

    pub fn is_resident(&self) -> bool {
        matches!(self.state, ChunkState::Resident(_))
    }

    /// Current ledger footprint; zero while evicted.
    pub fn byte_size(&self) -> usize {
        match &self.state {
            ChunkState::Resident(store) => store.byte_size(),
            ChunkState::Evicted => 0,
        }
    }

    /// Value at a local offset, or `None` while evicted.
    pub fn get(&self, local_row: usize, local_col: usize) -> Option<f64> {
        match &self.state {
            ChunkState::Resident(store) => Some(store.get(local_row, local_col)),
            ChunkState::Evicted => None,
        }
    }

    /// Write a value at a local offset, returning the previous value, or
    /// `None` while evicted.
    pub fn set(&mut self, local_row: usize, local_col: usize, value: f64) -> Option<f64> {
        match &mut self.state {
            ChunkState::Resident(store) => Some(store.set(local_row, local_col, value)),
            ChunkState::Evicted => None,
        }
    }

    /// Extra ledger bytes a `set` would require; zero while evicted.
    pub fn growth_for_set(&self, local_row: usize, local_col: usize, value: f64) -> usize {
        match &self.state {
            ChunkState::Resident(store) => store.growth_for_set(local_row, local_col, value),
            ChunkState::Evicted => 0,
        }
    }

    /// Whether applying `growth` more bytes would push a sparse store past
    /// the dense footprint, making promotion worthwhile.
    pub fn should_promote(&self, growth: usize) -> bool {
        match &self.state {
            ChunkState::Resident(store) => {
                store.is_promotable()
                    && store.byte_size() + growth > dense_cost(self.rows, self.cols)
            }
            ChunkState::Evicted => false,
        }
    }

    /// Convert a sparse resident store to dense, returning the ledger bytes
    /// freed by dropping the sparse representation.
    pub fn promote_to_dense(&mut self) -> usize {
        let ChunkState::Resident(store) = &self.state else {
            return 0;
        };
        let old_size = store.byte_size();
        let mut dense = DenseStore::filled(self.rows, self.cols, self.no_data);
        for lr in 0..self.rows {
            for lc in 0..self.cols {
                let v = store.get(lr, lc);
                if !same_value(v, self.no_data) {
                    dense.set(lr, lc, v);
                }
            }
        }
        self.state = ChunkState::Resident(Box::new(dense));
        old_size
    }

    /// Persist all cell values to `path` and release the in-memory store.
    ///
    /// Returns the ledger bytes freed. Evicting an already-evicted chunk is a
    /// no-op returning zero.
    pub fn evict(&mut self, path: &Path) -> Result<usize, GridError> {
        let ChunkState::Resident(store) = &self.state else {
            return Ok(0);
        };
        store::write_chunk(path, store.as_ref(), self.no_data)?;
        let freed = store.byte_size();
        self.state = ChunkState::Evicted;
        Ok(freed)
    }

    /// Restore the in-memory store from `path`.
    ///
    /// No-op if already resident. Fails with [`GridError::CorruptChunk`] if
    /// the persisted data does not match the expected geometry.
    pub fn reload(&mut self, path: &Path) -> Result<(), GridError> {
        if self.is_resident() {
            return Ok(());
        }
        let store = store::read_chunk(path, self.rows, self.cols, self.no_data)?;
        self.state = ChunkState::Resident(store);
        Ok(())
    }
}
