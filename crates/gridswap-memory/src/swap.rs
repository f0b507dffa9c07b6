//! Victim selection and eviction entry points.
//!
//! One canonical selector backs every eviction path. Priority order, lowest
//! commitment first:
//!
//! 1. an unprotected chunk of a grid other than the operating grid;
//! 2. an unprotected chunk of the operating grid, excluding the pinned chunk;
//! 3. a protected chunk anywhere, excluding the pinned chunk ("desperate");
//! 4. nothing; the caller decides whether that is fatal.
//!
//! Selection is deterministic for a fixed registration/protection state:
//! grids are walked in registration order and chunks in coordinate order.
//! The desperate fallback is reserved for the recovery loop, where the
//! alternative is a fatal failure; proactive threshold sweeps stop at
//! priority 2.

use crate::environment::Environment;
use crate::error::SwapError;
use gridswap_core::{ChunkCoord, ChunkId, GridId};
use std::collections::BTreeMap;
use tracing::debug;

/// Which chunks an eviction pass actually swapped, per grid.
#[derive(Debug, Clone, Default)]
pub struct SwapReport {
    pub evicted: BTreeMap<GridId, Vec<ChunkCoord>>,
}

impl SwapReport {
    pub fn count(&self) -> usize {
        self.evicted.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty()
    }

    fn record(&mut self, id: ChunkId) {
        self.evicted.entry(id.grid).or_default().push(id.coord);
    }
}

impl Environment {
    pub(crate) fn is_chunk_protected(&self, id: ChunkId) -> bool {
        self.protected
            .get(&id.grid)
            .is_some_and(|set| set.contains(&id.coord))
    }

    /// Select the next eviction victim, or `None` if nothing qualifies.
    ///
    /// Returns the chosen chunk and whether it came from the protected set.
    pub(crate) fn select_victim(
        &self,
        operating: Option<GridId>,
        pinned: Option<ChunkId>,
        allow_desperate: bool,
    ) -> Option<(ChunkId, bool)> {
        // Priority 1: unprotected chunks of non-operating grids.
        for (&grid_id, grid) in self.grids() {
            if Some(grid_id) == operating {
                continue;
            }
            for coord in grid.resident_chunks() {
                let id = ChunkId::new(grid_id, coord);
                if Some(id) != pinned && !self.is_chunk_protected(id) {
                    return Some((id, false));
                }
            }
        }

        // Priority 2: unprotected chunks of the operating grid.
        if let Some(grid_id) = operating {
            if let Some(grid) = self.grids().get(&grid_id) {
                for coord in grid.resident_chunks() {
                    let id = ChunkId::new(grid_id, coord);
                    if Some(id) != pinned && !self.is_chunk_protected(id) {
                        return Some((id, false));
                    }
                }
            }
        }

        if !allow_desperate {
            return None;
        }

        // Priority 3: protected chunks, sparing only the pinned chunk.
        for (&grid_id, grid) in self.grids() {
            for coord in grid.resident_chunks() {
                let id = ChunkId::new(grid_id, coord);
                if Some(id) != pinned {
                    return Some((id, true));
                }
            }
        }

        None
    }

    /// Evict one specific chunk; returns whether it held resident data.
    pub(crate) fn evict(&mut self, id: ChunkId) -> Result<bool, SwapError> {
        Ok(self.grid_mut(id.grid)?.swap_chunk(id.coord)?)
    }

    /// Force-evict one specific chunk regardless of protection.
    ///
    /// Returns whether it actually held resident data to evict.
    pub fn swap_chunk(&mut self, id: ChunkId) -> Result<bool, SwapError> {
        self.evict(id)
    }

    /// Evict the single lowest-commitment chunk. Returns whether anything
    /// swapped. Never touches the protected set.
    pub fn swap_any(&mut self) -> Result<bool, SwapError> {
        match self.select_victim(None, None, false) {
            Some((victim, _)) => self.evict(victim),
            None => Ok(false),
        }
    }

    /// Evict one chunk of a specific grid. Returns whether anything swapped.
    pub fn swap_grid_any(&mut self, id: GridId) -> Result<bool, SwapError> {
        let candidate = self
            .grid(id)?
            .resident_chunks()
            .into_iter()
            .map(|coord| ChunkId::new(id, coord))
            .find(|c| !self.is_chunk_protected(*c));
        match candidate {
            Some(victim) => self.evict(victim),
            None => Ok(false),
        }
    }

    /// Evict every resident chunk of one grid, protected or not, reporting
    /// exactly which chunks swapped.
    pub fn swap_grid(&mut self, id: GridId) -> Result<SwapReport, SwapError> {
        let mut report = SwapReport::default();
        for coord in self.grid(id)?.resident_chunks() {
            let chunk_id = ChunkId::new(id, coord);
            if self.evict(chunk_id)? {
                report.record(chunk_id);
            }
        }
        Ok(report)
    }

    /// Evict every resident chunk across the registry, reporting exactly
    /// which chunks swapped.
    pub fn swap_all(&mut self) -> Result<SwapReport, SwapError> {
        let mut report = SwapReport::default();
        for grid_id in self.grid_ids() {
            let grid_report = self.swap_grid(grid_id)?;
            for (g, coords) in grid_report.evicted {
                report.evicted.entry(g).or_default().extend(coords);
            }
        }
        Ok(report)
    }

    /// Compare free fast memory against the threshold and proactively evict
    /// until back above it.
    ///
    /// Returns `Ok(true)` once free memory meets the threshold, `Ok(false)`
    /// if the unprotected working set ran out first; callers choose whether
    /// insufficient recovery is fatal. The protected set is honored
    /// unconditionally here; desperation is reserved for the retry loop.
    pub fn check_and_maybe_free_memory(&mut self) -> Result<bool, SwapError> {
        let mut freed = 0usize;
        while self.pool().borrow().below_threshold() {
            match self.select_victim(None, None, false) {
                Some((victim, _)) => {
                    self.evict(victim)?;
                    freed += 1;
                }
                None => {
                    debug!(freed, "threshold sweep ran out of unprotected chunks");
                    return Ok(false);
                }
            }
        }
        if freed > 0 {
            debug!(freed, free = self.free_bytes(), "threshold sweep complete");
        }
        Ok(true)
    }
}
