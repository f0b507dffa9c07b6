//! Chunk-addressed raster grid.
//!
//! A [`Grid`] owns its geometry, its no-data value, and a growable registry
//! of [`Chunk`]s keyed by [`ChunkCoord`]. Chunks are created lazily as
//! regions are touched, reloaded transparently from the grid's backing
//! directory when an evicted chunk is accessed, and evicted by the swapping
//! layer under memory pressure.
//!
//! Every allocation (fresh chunk, reload, sparse growth, promotion) is
//! charged against the shared fast-memory ledger *before* it happens, so the
//! recoverable [`GridError::Exhausted`] signal fires with no partial state
//! left behind; the swapping layer's retry protocol relies on that.

use crate::chunk::{dense_cost, same_value, sparse_cost, Chunk};
use crate::coord::{to_local, ChunkCoord, ChunkId, GridId};
use crate::dimensions::GridDimensions;
use crate::error::GridError;
use crate::pool::PoolHandle;
use crate::stats::ObserverHandle;
use crate::store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// Default nominal chunk size in both dimensions.
pub const DEFAULT_CHUNK_SIZE: usize = 64;
/// Default no-data value (ESRI convention).
pub const DEFAULT_NO_DATA: f64 = -9999.0;

const HEADER_FILE: &str = "header.json";

/// Number of chunks covering `cells` cells at `chunk` cells per chunk.
fn lattice_dim(cells: u64, chunk: usize) -> u32 {
    let n = cells.div_ceil(chunk as u64);
    assert!(n <= u32::MAX as u64, "chunk lattice dimension exceeds u32");
    n as u32
}

/// Geometry and metadata describing a grid; persisted as the grid's
/// `header.json` so a backing directory can be reopened without external
/// input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSpec {
    pub name: String,
    pub n_rows: u64,
    pub n_cols: u64,
    /// Nominal chunk height; the trailing chunk row may be shorter.
    pub chunk_rows: usize,
    /// Nominal chunk width; the trailing chunk column may be narrower.
    pub chunk_cols: usize,
    pub no_data: f64,
    pub dimensions: GridDimensions,
}

impl GridSpec {
    pub fn new(name: impl Into<String>, n_rows: u64, n_cols: u64) -> Self {
        assert!(n_rows > 0 && n_cols > 0, "grid must have at least one cell");
        Self {
            name: name.into(),
            n_rows,
            n_cols,
            chunk_rows: DEFAULT_CHUNK_SIZE,
            chunk_cols: DEFAULT_CHUNK_SIZE,
            no_data: DEFAULT_NO_DATA,
            dimensions: GridDimensions::unit(n_rows, n_cols),
        }
    }

    pub fn with_chunk_size(mut self, chunk_rows: usize, chunk_cols: usize) -> Self {
        assert!(
            chunk_rows > 0 && chunk_cols > 0,
            "chunk must have at least one cell"
        );
        // Sparse stores key cells by (u16, u16) local coordinates
        assert!(
            chunk_rows <= u16::MAX as usize && chunk_cols <= u16::MAX as usize,
            "chunk dimensions must fit u16 local coordinates"
        );
        self.chunk_rows = chunk_rows;
        self.chunk_cols = chunk_cols;
        self
    }

    pub fn with_no_data(mut self, no_data: f64) -> Self {
        self.no_data = no_data;
        self
    }

    pub fn with_dimensions(mut self, dimensions: GridDimensions) -> Self {
        self.dimensions = dimensions;
        self
    }
}

/// One raster grid with swappable chunk storage.
pub struct Grid {
    id: GridId,
    spec: GridSpec,
    n_chunk_rows: u32,
    n_chunk_cols: u32,
    dir: PathBuf,
    chunks: BTreeMap<ChunkCoord, Chunk>,
    pool: PoolHandle,
    observer: Option<ObserverHandle>,
}

impl std::fmt::Debug for Grid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grid")
            .field("id", &self.id)
            .field("name", &self.spec.name)
            .field("n_rows", &self.spec.n_rows)
            .field("n_cols", &self.spec.n_cols)
            .field("chunks", &self.chunks.len())
            .finish()
    }
}

impl Grid {
    /// Create a fresh all-no-data grid backed by `dir`.
    ///
    /// Writes the metadata header immediately; chunk files appear as chunks
    /// are evicted.
    pub fn create(
        id: GridId,
        spec: GridSpec,
        dir: impl Into<PathBuf>,
        pool: PoolHandle,
    ) -> Result<Self, GridError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let grid = Self {
            id,
            n_chunk_rows: lattice_dim(spec.n_rows, spec.chunk_rows),
            n_chunk_cols: lattice_dim(spec.n_cols, spec.chunk_cols),
            spec,
            dir,
            chunks: BTreeMap::new(),
            pool,
            observer: None,
        };
        grid.write_header()?;
        Ok(grid)
    }

    /// Reopen a grid from a backing directory written by a previous session.
    ///
    /// Every chunk with a file on disk starts in the evicted state; untouched
    /// regions stay unregistered (implicitly no-data).
    pub fn open(id: GridId, dir: impl Into<PathBuf>, pool: PoolHandle) -> Result<Self, GridError> {
        let dir = dir.into();
        let raw = fs::read_to_string(dir.join(HEADER_FILE))?;
        let spec: GridSpec = serde_json::from_str(&raw)?;
        let mut grid = Self {
            id,
            n_chunk_rows: lattice_dim(spec.n_rows, spec.chunk_rows),
            n_chunk_cols: lattice_dim(spec.n_cols, spec.chunk_cols),
            spec,
            dir,
            chunks: BTreeMap::new(),
            pool,
            observer: None,
        };
        for chunk_row in 0..grid.n_chunk_rows {
            for chunk_col in 0..grid.n_chunk_cols {
                let coord = ChunkCoord::new(chunk_row, chunk_col);
                if grid.chunk_path(coord).exists() {
                    let (rows, cols) = grid.chunk_extent(coord);
                    grid.chunks
                        .insert(coord, Chunk::evicted(rows, cols, grid.spec.no_data));
                }
            }
        }
        Ok(grid)
    }

    fn write_header(&self) -> Result<(), GridError> {
        let raw = serde_json::to_string_pretty(&self.spec)?;
        fs::write(self.dir.join(HEADER_FILE), raw)?;
        Ok(())
    }

    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn n_rows(&self) -> u64 {
        self.spec.n_rows
    }

    pub fn n_cols(&self) -> u64 {
        self.spec.n_cols
    }

    pub fn chunk_rows(&self) -> usize {
        self.spec.chunk_rows
    }

    pub fn chunk_cols(&self) -> usize {
        self.spec.chunk_cols
    }

    pub fn n_chunk_rows(&self) -> u32 {
        self.n_chunk_rows
    }

    pub fn n_chunk_cols(&self) -> u32 {
        self.n_chunk_cols
    }

    pub fn no_data(&self) -> f64 {
        self.spec.no_data
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.spec.dimensions
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Attach a statistics observer notified on every cell mutation.
    ///
    /// Cells written before attachment are unobserved; aggregates reflect
    /// mutations from this point on.
    pub fn set_observer(&mut self, observer: ObserverHandle) {
        self.observer = Some(observer);
    }

    pub fn in_bounds(&self, row: i64, col: i64) -> bool {
        row >= 0 && col >= 0 && (row as u64) < self.spec.n_rows && (col as u64) < self.spec.n_cols
    }

    /// Chunk coordinate containing a cell, or `None` when out of bounds.
    pub fn chunk_coord_of(&self, row: i64, col: i64) -> Option<ChunkCoord> {
        if !self.in_bounds(row, col) {
            return None;
        }
        Some(ChunkCoord::from_cell(
            row as u64,
            col as u64,
            self.spec.chunk_rows,
            self.spec.chunk_cols,
        ))
    }

    /// Actual extent of a chunk; trailing chunks are truncated to the grid
    /// boundary. Off-lattice coordinates have a zero extent.
    pub fn chunk_extent(&self, coord: ChunkCoord) -> (usize, usize) {
        let row_start = coord.chunk_row as u64 * self.spec.chunk_rows as u64;
        let col_start = coord.chunk_col as u64 * self.spec.chunk_cols as u64;
        let rows = self
            .spec
            .n_rows
            .saturating_sub(row_start)
            .min(self.spec.chunk_rows as u64) as usize;
        let cols = self
            .spec
            .n_cols
            .saturating_sub(col_start)
            .min(self.spec.chunk_cols as u64) as usize;
        (rows, cols)
    }

    /// Backing file for a chunk.
    pub fn chunk_path(&self, coord: ChunkCoord) -> PathBuf {
        self.dir.join(store::chunk_file_name(coord))
    }

    /// All chunk keys currently registered for this grid.
    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks
            .keys()
            .map(|&coord| ChunkId::new(self.id, coord))
            .collect()
    }

    /// Coordinates of resident chunks, in deterministic order.
    pub fn resident_chunks(&self) -> Vec<ChunkCoord> {
        self.chunks
            .iter()
            .filter(|(_, c)| c.is_resident())
            .map(|(&coord, _)| coord)
            .collect()
    }

    pub fn resident_count(&self) -> usize {
        self.chunks.values().filter(|c| c.is_resident()).count()
    }

    /// Ledger bytes currently held by this grid's resident chunks.
    pub fn resident_bytes(&self) -> usize {
        self.chunks.values().map(Chunk::byte_size).sum()
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord)
    }

    /// Ensure the chunk at `coord` is resident, creating a fresh all-no-data
    /// chunk or reloading from the backing file as needed.
    ///
    /// This is the point where new in-memory allocations occur: the ledger is
    /// charged first, and a failed charge surfaces as the recoverable
    /// [`GridError::Exhausted`] with nothing allocated. Coordinates outside
    /// the chunk lattice fail with [`GridError::OffLattice`].
    pub fn load_chunk(&mut self, coord: ChunkCoord) -> Result<(), GridError> {
        if coord.chunk_row >= self.n_chunk_rows || coord.chunk_col >= self.n_chunk_cols {
            return Err(GridError::OffLattice {
                coord,
                rows: self.n_chunk_rows,
                cols: self.n_chunk_cols,
            });
        }
        let pool = Rc::clone(&self.pool);
        let path = self.chunk_path(coord);
        let (rows, cols) = self.chunk_extent(coord);

        if !self.chunks.contains_key(&coord) {
            pool.borrow_mut().try_charge(sparse_cost(0))?;
            self.chunks
                .insert(coord, Chunk::new_sparse(rows, cols, self.spec.no_data));
            return Ok(());
        }

        let chunk = self
            .chunks
            .get_mut(&coord)
            .expect("chunk was just looked up");
        if chunk.is_resident() {
            return Ok(());
        }

        // Charge the dense worst case up front, then give back the surplus
        // once the actual encoding is known.
        let estimate = dense_cost(rows, cols);
        pool.borrow_mut().try_charge(estimate)?;
        match chunk.reload(&path) {
            Ok(()) => {
                let actual = chunk.byte_size();
                pool.borrow_mut().release(estimate - actual);
                debug!(grid = %self.id, chunk = %coord, bytes = actual, "reloaded chunk");
                Ok(())
            }
            Err(e) => {
                pool.borrow_mut().release(estimate);
                Err(e)
            }
        }
    }

    /// Read one cell. Out-of-bounds coordinates return the no-data value;
    /// untouched regions are implicitly no-data and cost nothing to read.
    pub fn get_cell(&mut self, row: i64, col: i64) -> Result<f64, GridError> {
        let Some(coord) = self.chunk_coord_of(row, col) else {
            return Ok(self.spec.no_data);
        };
        if !self.chunks.contains_key(&coord) {
            return Ok(self.spec.no_data);
        }
        self.load_chunk(coord)?;
        let (lr, lc) = to_local(
            row as u64,
            col as u64,
            self.spec.chunk_rows,
            self.spec.chunk_cols,
        );
        let chunk = self.chunks.get(&coord).expect("chunk was just loaded");
        Ok(chunk.get(lr, lc).expect("chunk was just loaded"))
    }

    /// Write one cell, returning the previous value.
    ///
    /// Out-of-bounds writes are no-ops returning the no-data value, matching
    /// the read side. An attached observer is notified of the delta.
    pub fn set_cell(&mut self, row: i64, col: i64, value: f64) -> Result<f64, GridError> {
        let Some(coord) = self.chunk_coord_of(row, col) else {
            return Ok(self.spec.no_data);
        };
        self.load_chunk(coord)?;

        let pool = Rc::clone(&self.pool);
        let (lr, lc) = to_local(
            row as u64,
            col as u64,
            self.spec.chunk_rows,
            self.spec.chunk_cols,
        );
        let chunk = self.chunks.get_mut(&coord).expect("chunk was just loaded");

        let mut growth = chunk.growth_for_set(lr, lc, value);
        if chunk.should_promote(growth) {
            let dense = dense_cost(chunk.rows(), chunk.cols());
            pool.borrow_mut().try_charge(dense)?;
            let freed = chunk.promote_to_dense();
            pool.borrow_mut().release(freed);
            growth = 0;
        }
        if growth > 0 {
            pool.borrow_mut().try_charge(growth)?;
        }

        let before = chunk.byte_size();
        let old = chunk.set(lr, lc, value).expect("chunk was just loaded");
        let after = chunk.byte_size();
        // A set that removed a sparse entry shrank the store below what was
        // charged; reconcile the ledger.
        let expected = before + growth;
        if after < expected {
            pool.borrow_mut().release(expected - after);
        }

        if !same_value(old, value) {
            if let Some(observer) = &self.observer {
                observer
                    .borrow_mut()
                    .cell_changed(row as u64, col as u64, old, value);
            }
        }
        Ok(old)
    }

    /// Evict one chunk to its backing file.
    ///
    /// Returns whether the chunk actually held resident data. Never performs
    /// policy decisions; which chunk to evict is the swapping layer's call.
    pub fn swap_chunk(&mut self, coord: ChunkCoord) -> Result<bool, GridError> {
        let pool = Rc::clone(&self.pool);
        let path = self.chunk_path(coord);
        let Some(chunk) = self.chunks.get_mut(&coord) else {
            return Ok(false);
        };
        if !chunk.is_resident() {
            return Ok(false);
        }
        let freed = chunk.evict(&path)?;
        pool.borrow_mut().release(freed);
        debug!(grid = %self.id, chunk = %coord, freed, "evicted chunk");
        Ok(true)
    }

    /// Evict every resident chunk, returning how many were swapped.
    pub fn swap_all(&mut self) -> Result<usize, GridError> {
        let mut swapped = 0;
        for coord in self.resident_chunks() {
            if self.swap_chunk(coord)? {
                swapped += 1;
            }
        }
        Ok(swapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SPARSE_ENTRY_BYTES;
    use crate::pool::FastMemory;
    use crate::stats::RunningStats;

    fn test_grid(dir: &Path, budget: usize) -> Grid {
        let pool = FastMemory::shared(budget);
        let spec = GridSpec::new("test", 4, 4)
            .with_chunk_size(2, 2)
            .with_no_data(-9999.0);
        Grid::create(GridId(1), spec, dir, pool).unwrap()
    }

    #[test]
    fn test_out_of_bounds_returns_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);

        assert_eq!(grid.get_cell(-1, 0).unwrap(), -9999.0);
        assert_eq!(grid.get_cell(0, -1).unwrap(), -9999.0);
        assert_eq!(grid.get_cell(4, 0).unwrap(), -9999.0);
        assert_eq!(grid.get_cell(0, 4).unwrap(), -9999.0);
        // Out-of-bounds writes are no-ops
        assert_eq!(grid.set_cell(-1, 0, 1.0).unwrap(), -9999.0);
        assert_eq!(grid.chunk_ids().len(), 0);
    }

    #[test]
    fn test_lazy_chunk_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);

        // Reads never allocate chunks
        assert_eq!(grid.get_cell(1, 1).unwrap(), -9999.0);
        assert_eq!(grid.chunk_ids().len(), 0);

        // Writes create exactly one chunk per touched region
        grid.set_cell(0, 0, 5.0).unwrap();
        grid.set_cell(1, 1, 6.0).unwrap();
        assert_eq!(grid.chunk_ids().len(), 1);
        grid.set_cell(3, 3, 7.0).unwrap();
        assert_eq!(grid.chunk_ids().len(), 2);
    }

    #[test]
    fn test_set_then_get_returns_new_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);

        assert_eq!(grid.set_cell(2, 3, 1.5).unwrap(), -9999.0);
        assert_eq!(grid.get_cell(2, 3).unwrap(), 1.5);
        assert_eq!(grid.set_cell(2, 3, 2.5).unwrap(), 1.5);
        assert_eq!(grid.get_cell(2, 3).unwrap(), 2.5);
    }

    #[test]
    fn test_durability_across_swap() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);

        grid.set_cell(0, 0, 5.0).unwrap();
        let coord = grid.chunk_coord_of(0, 0).unwrap();
        assert!(grid.swap_chunk(coord).unwrap());
        assert!(!grid.chunk(coord).unwrap().is_resident());

        // Swapping an already-evicted chunk reports nothing to do
        assert!(!grid.swap_chunk(coord).unwrap());

        assert_eq!(grid.get_cell(0, 0).unwrap(), 5.0);
        assert!(grid.chunk(coord).unwrap().is_resident());
    }

    #[test]
    fn test_swap_all_and_end_to_end_values() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);

        grid.set_cell(0, 0, 5.0).unwrap();
        grid.set_cell(3, 3, 7.0).unwrap();
        assert_eq!(grid.swap_all().unwrap(), 2);
        assert_eq!(grid.resident_count(), 0);

        assert_eq!(grid.get_cell(0, 0).unwrap(), 5.0);
        assert_eq!(grid.get_cell(3, 3).unwrap(), 7.0);
        assert_eq!(grid.get_cell(1, 1).unwrap(), -9999.0);
    }

    #[test]
    #[should_panic(expected = "chunk lattice dimension exceeds u32")]
    fn test_lattice_overflow_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let pool = FastMemory::shared(1024);
        let spec = GridSpec::new("huge", u64::MAX, 1).with_chunk_size(1, 1);
        let _ = Grid::create(GridId(7), spec, dir.path(), pool);
    }

    #[test]
    #[should_panic(expected = "fit u16 local coordinates")]
    fn test_chunk_size_rejects_oversized() {
        let _ = GridSpec::new("big", 100_000, 10).with_chunk_size(70_000, 1);
    }

    #[test]
    fn test_trailing_chunks_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let pool = FastMemory::shared(1 << 20);
        let spec = GridSpec::new("odd", 5, 3).with_chunk_size(2, 2);
        let grid = Grid::create(GridId(2), spec, dir.path(), pool).unwrap();

        assert_eq!(grid.n_chunk_rows(), 3);
        assert_eq!(grid.n_chunk_cols(), 2);
        assert_eq!(grid.chunk_extent(ChunkCoord::new(0, 0)), (2, 2));
        assert_eq!(grid.chunk_extent(ChunkCoord::new(2, 0)), (1, 2));
        assert_eq!(grid.chunk_extent(ChunkCoord::new(0, 1)), (2, 1));
        assert_eq!(grid.chunk_extent(ChunkCoord::new(2, 1)), (1, 1));
    }

    #[test]
    fn test_load_chunk_off_lattice() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);

        // 4x4 grid with 2x2 chunks: the lattice is 2x2
        let err = grid.load_chunk(ChunkCoord::new(2, 0)).unwrap_err();
        assert!(matches!(err, GridError::OffLattice { .. }));
        assert_eq!(grid.chunk_extent(ChunkCoord::new(2, 0)), (0, 0));
        assert_eq!(grid.chunk_ids().len(), 0);
    }

    #[test]
    fn test_ledger_matches_resident_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = FastMemory::shared(1 << 20);
        let spec = GridSpec::new("ledger", 64, 64).with_chunk_size(8, 8);
        let mut grid = Grid::create(GridId(3), spec, dir.path(), Rc::clone(&pool)).unwrap();

        // Fill one chunk densely enough to force promotion
        for row in 0..8 {
            for col in 0..8 {
                grid.set_cell(row, col, (row * 8 + col) as f64).unwrap();
            }
        }
        grid.set_cell(20, 20, 1.0).unwrap();

        assert_eq!(pool.borrow().used(), grid.resident_bytes());

        let coord = grid.chunk_coord_of(0, 0).unwrap();
        assert!(grid.chunk(coord).unwrap().byte_size() > 0);
        grid.swap_chunk(coord).unwrap();
        assert_eq!(pool.borrow().used(), grid.resident_bytes());

        grid.get_cell(0, 0).unwrap();
        assert_eq!(pool.borrow().used(), grid.resident_bytes());
    }

    #[test]
    fn test_sparse_entry_removal_releases_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = FastMemory::shared(1 << 20);
        let spec = GridSpec::new("shrink", 16, 16).with_chunk_size(8, 8);
        let mut grid = Grid::create(GridId(4), spec, dir.path(), Rc::clone(&pool)).unwrap();

        grid.set_cell(0, 0, 3.0).unwrap();
        let grown = pool.borrow().used();
        grid.set_cell(0, 0, DEFAULT_NO_DATA).unwrap();
        assert_eq!(pool.borrow().used(), grown - SPARSE_ENTRY_BYTES);
    }

    #[test]
    fn test_exhaustion_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 16);

        let err = grid.set_cell(0, 0, 1.0).unwrap_err();
        assert!(err.is_exhausted());
        // Nothing was allocated by the failed attempt
        assert_eq!(grid.chunk_ids().len(), 0);
    }

    #[test]
    fn test_open_from_backing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pool = FastMemory::shared(1 << 20);
        {
            let mut grid = test_grid(dir.path(), 1 << 20);
            grid.set_cell(0, 0, 5.0).unwrap();
            grid.set_cell(3, 3, 7.0).unwrap();
            grid.swap_all().unwrap();
        }

        let mut reopened = Grid::open(GridId(9), dir.path(), pool).unwrap();
        assert_eq!(reopened.name(), "test");
        assert_eq!(reopened.n_rows(), 4);
        // Both persisted chunks are registered, evicted
        assert_eq!(reopened.chunk_ids().len(), 2);
        assert_eq!(reopened.resident_count(), 0);

        assert_eq!(reopened.get_cell(0, 0).unwrap(), 5.0);
        assert_eq!(reopened.get_cell(3, 3).unwrap(), 7.0);
        assert_eq!(reopened.get_cell(1, 1).unwrap(), -9999.0);
    }

    #[test]
    fn test_observer_sees_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);
        let stats = RunningStats::shared(-9999.0);
        grid.set_observer(stats.clone());

        grid.set_cell(0, 0, 5.0).unwrap();
        grid.set_cell(3, 3, 7.0).unwrap();
        assert_eq!(stats.borrow().count(), 2);
        assert_eq!(stats.borrow().sum(), 12.0);

        grid.set_cell(0, 0, 3.0).unwrap();
        assert_eq!(stats.borrow().count(), 2);
        assert_eq!(stats.borrow().sum(), 10.0);

        grid.set_cell(3, 3, -9999.0).unwrap();
        assert_eq!(stats.borrow().count(), 1);
        assert_eq!(stats.borrow().sum(), 3.0);
    }

    #[test]
    fn test_observer_attached_after_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut grid = test_grid(dir.path(), 1 << 20);

        grid.set_cell(0, 0, 5.0).unwrap();
        let stats = RunningStats::shared(-9999.0);
        grid.set_observer(stats.clone());

        // Overwriting a pre-attachment value records only the new value
        grid.set_cell(0, 0, 3.0).unwrap();
        assert_eq!(stats.borrow().count(), 1);
        assert_eq!(stats.borrow().sum(), 3.0);
    }
}
