//! The swapping environment: process-wide state for out-of-core grids.
//!
//! One [`Environment`] per session owns the registered grids, the shared
//! fast-memory ledger, and the per-grid protected ("not-to-swap") sets. It is
//! passed explicitly to whoever needs it, never a hidden singleton, so
//! registry and protected-set lifetimes stay visible and testable.
//!
//! Every allocation-sensitive operation (cell access, chunk residency, bulk
//! sub-grid construction) goes through the single recovery protocol in
//! `recover.rs`: try, evict one victim on memory pressure, retry. Callers of
//! this module's public API never observe recoverable exhaustion.

use crate::config::SwapConfig;
use crate::error::SwapError;
use gridswap_core::{
    same_value, ChunkCoord, ChunkId, FastMemory, Grid, GridId, GridSpec, PoolHandle,
};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, warn};

/// Process-wide registry of grids plus the swap policy state.
pub struct Environment {
    config: SwapConfig,
    pool: PoolHandle,
    grids: BTreeMap<GridId, Grid>,
    /// Chunks pinned by in-progress operations, excluded from eviction
    /// unless no alternative exists.
    pub(crate) protected: BTreeMap<GridId, BTreeSet<ChunkCoord>>,
    next_id: u64,
}

impl Environment {
    /// Create an environment, its swap directory, and its primed reserve.
    pub fn new(config: SwapConfig) -> Result<Self, SwapError> {
        std::fs::create_dir_all(&config.swap_dir).map_err(gridswap_core::GridError::from)?;
        let pool = FastMemory::shared(config.budget_bytes);
        {
            let mut p = pool.borrow_mut();
            p.set_threshold(config.threshold_bytes);
            p.set_reserve_size(config.reserve_bytes);
            if !p.prime_reserve() {
                warn!(
                    reserve = config.reserve_bytes,
                    budget = config.budget_bytes,
                    "budget too small to hold the swap reserve"
                );
            }
        }
        Ok(Self {
            config,
            pool,
            grids: BTreeMap::new(),
            protected: BTreeMap::new(),
            next_id: 1,
        })
    }

    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    fn alloc_id(&mut self) -> GridId {
        let id = GridId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a fresh all-no-data grid backed by a directory under the
    /// environment's swap directory.
    pub fn create_grid(&mut self, spec: GridSpec) -> Result<GridId, SwapError> {
        let id = self.alloc_id();
        let dir = self.config.swap_dir.join(format!("g{}", id.0));
        let grid = Grid::create(id, spec, dir, self.pool.clone())?;
        debug!(grid = %id, name = grid.name(), "registered grid");
        self.grids.insert(id, grid);
        Ok(id)
    }

    /// Register a grid reopened from an existing backing directory.
    pub fn open_grid(&mut self, dir: &Path) -> Result<GridId, SwapError> {
        let id = self.alloc_id();
        let grid = Grid::open(id, dir, self.pool.clone())?;
        debug!(grid = %id, name = grid.name(), "reopened grid");
        self.grids.insert(id, grid);
        Ok(id)
    }

    /// Unregister a grid, persisting its resident chunks first and dropping
    /// any protected entries it held. The backing directory remains on disk.
    pub fn remove_grid(&mut self, id: GridId) -> Result<(), SwapError> {
        let grid = self.grids.get_mut(&id).ok_or(SwapError::UnknownGrid(id))?;
        grid.swap_all()?;
        self.grids.remove(&id);
        self.protected.remove(&id);
        debug!(grid = %id, "unregistered grid");
        Ok(())
    }

    pub fn grid(&self, id: GridId) -> Result<&Grid, SwapError> {
        self.grids.get(&id).ok_or(SwapError::UnknownGrid(id))
    }

    /// Direct mutable access to a registered grid.
    ///
    /// Mutations made this way bypass the recovery protocol; grid methods may
    /// surface recoverable exhaustion. Prefer the environment's wrapped
    /// operations for anything allocation-sensitive.
    pub fn grid_mut(&mut self, id: GridId) -> Result<&mut Grid, SwapError> {
        self.grids.get_mut(&id).ok_or(SwapError::UnknownGrid(id))
    }

    pub(crate) fn grids(&self) -> &BTreeMap<GridId, Grid> {
        &self.grids
    }

    pub fn grid_ids(&self) -> Vec<GridId> {
        self.grids.keys().copied().collect()
    }

    pub(crate) fn pool(&self) -> &PoolHandle {
        &self.pool
    }

    pub fn used_bytes(&self) -> usize {
        self.pool.borrow().used()
    }

    pub fn free_bytes(&self) -> usize {
        self.pool.borrow().free()
    }

    pub fn budget_bytes(&self) -> usize {
        self.pool.borrow().budget()
    }

    /// Adjust the fast-memory budget at runtime.
    pub fn set_budget(&mut self, bytes: usize) {
        self.pool.borrow_mut().set_budget(bytes);
    }

    /// Adjust the proactive-eviction threshold at runtime.
    pub fn set_threshold(&mut self, bytes: usize) {
        self.pool.borrow_mut().set_threshold(bytes);
    }

    /// Read one cell through the recovery protocol.
    ///
    /// Out-of-bounds coordinates return the grid's no-data value.
    pub fn cell(&mut self, id: GridId, row: i64, col: i64) -> Result<f64, SwapError> {
        let pinned = self.grid(id)?.chunk_coord_of(row, col);
        self.run_recovered(id, pinned, |grid| grid.get_cell(row, col))
    }

    /// Write one cell through the recovery protocol, returning the previous
    /// value. Out-of-bounds writes are no-ops returning no-data.
    pub fn set_cell(&mut self, id: GridId, row: i64, col: i64, value: f64) -> Result<f64, SwapError> {
        let pinned = self.grid(id)?.chunk_coord_of(row, col);
        self.run_recovered(id, pinned, |grid| grid.set_cell(row, col, value))
    }

    /// Ensure one chunk is resident, loading or creating it through the
    /// recovery protocol. This is the chunk-granular access point wrapped by
    /// the retry pattern, since it is where new allocations occur.
    pub fn ensure_chunk(&mut self, id: GridId, coord: ChunkCoord) -> Result<(), SwapError> {
        {
            let grid = self.grid(id)?;
            if coord.chunk_row >= grid.n_chunk_rows() || coord.chunk_col >= grid.n_chunk_cols() {
                return Err(SwapError::Config(format!(
                    "chunk {coord} outside the lattice of {id}"
                )));
            }
        }
        self.run_recovered(id, Some(coord), |grid| grid.load_chunk(coord))
    }

    /// Register a derived sub-grid copied from a rectangular region of an
    /// existing grid.
    ///
    /// The copy runs cell-by-cell through the recovery protocol with the
    /// source chunk currently being read held in the protected set, so
    /// eviction pressure during the copy lands elsewhere first.
    pub fn subgrid(
        &mut self,
        src_id: GridId,
        name: &str,
        rows: Range<u64>,
        cols: Range<u64>,
    ) -> Result<GridId, SwapError> {
        let (spec, no_data) = {
            let src = self.grid(src_id)?;
            if rows.start >= rows.end || cols.start >= cols.end {
                return Err(SwapError::Config("empty sub-grid range".into()));
            }
            if rows.end > src.n_rows() || cols.end > src.n_cols() {
                return Err(SwapError::Config(format!(
                    "sub-grid range {rows:?} x {cols:?} exceeds source extent {}x{}",
                    src.n_rows(),
                    src.n_cols()
                )));
            }
            let n_rows = rows.end - rows.start;
            let n_cols = cols.end - cols.start;
            let spec = GridSpec::new(name, n_rows, n_cols)
                .with_chunk_size(src.chunk_rows(), src.chunk_cols())
                .with_no_data(src.no_data())
                .with_dimensions(src.dimensions().sub_region(
                    rows.start,
                    cols.start,
                    n_rows,
                    n_cols,
                ));
            (spec, src.no_data())
        };

        let dst_id = self.create_grid(spec)?;
        let snapshot = self.protected_snapshot();
        let result = self.copy_region(src_id, dst_id, rows, cols, no_data);
        self.restore_protected(snapshot);
        match result {
            Ok(()) => Ok(dst_id),
            Err(e) => {
                // Best effort: drop the half-built grid before reporting.
                let _ = self.remove_grid(dst_id);
                Err(e)
            }
        }
    }

    fn copy_region(
        &mut self,
        src_id: GridId,
        dst_id: GridId,
        rows: Range<u64>,
        cols: Range<u64>,
        no_data: f64,
    ) -> Result<(), SwapError> {
        let mut guarded: Option<ChunkCoord> = None;
        for row in rows.clone() {
            for col in cols.clone() {
                let src_coord = self
                    .grid(src_id)?
                    .chunk_coord_of(row as i64, col as i64)
                    .expect("range was validated against the source extent");
                if guarded != Some(src_coord) {
                    if let Some(old) = guarded {
                        self.unprotect(ChunkId::new(src_id, old));
                    }
                    self.protect(ChunkId::new(src_id, src_coord));
                    guarded = Some(src_coord);
                }
                let value = self.cell(src_id, row as i64, col as i64)?;
                if !same_value(value, no_data) {
                    self.set_cell(
                        dst_id,
                        (row - rows.start) as i64,
                        (col - cols.start) as i64,
                        value,
                    )?;
                }
            }
        }
        Ok(())
    }
}
