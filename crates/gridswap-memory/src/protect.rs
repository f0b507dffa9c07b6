//! Protected-set ("not-to-swap") bookkeeping.
//!
//! Pure bookkeeping, no swapping: these operations adjust which chunks the
//! victim selector must pass over. The protected set is a hint, not a
//! guarantee: the recovery loop may still evict from it when the only
//! alternative is failing the operation.

use crate::environment::Environment;
use crate::error::SwapError;
use gridswap_core::{ChunkCoord, ChunkId, GridId};
use std::collections::{BTreeMap, BTreeSet};

/// A saved copy of the protected map, restorable or mergeable later.
///
/// Windowed computations snapshot the current state, pin their working
/// neighborhood, and restore the snapshot when done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedSnapshot {
    entries: BTreeMap<GridId, BTreeSet<ChunkCoord>>,
}

impl ProtectedSnapshot {
    /// Union this snapshot with another, per grid.
    pub fn union(mut self, other: ProtectedSnapshot) -> ProtectedSnapshot {
        for (grid, coords) in other.entries {
            self.entries.entry(grid).or_default().extend(coords);
        }
        self
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.entries
            .get(&id.grid)
            .is_some_and(|set| set.contains(&id.coord))
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Environment {
    /// Pin one chunk against eviction.
    pub fn protect(&mut self, id: ChunkId) {
        self.protected.entry(id.grid).or_default().insert(id.coord);
    }

    /// Pin several chunks at once.
    pub fn protect_many(&mut self, ids: impl IntoIterator<Item = ChunkId>) {
        for id in ids {
            self.protect(id);
        }
    }

    /// Pin every chunk within `radius` chunks of a center chunk (Chebyshev
    /// distance), clamped to the grid's chunk lattice.
    ///
    /// This is the spatial dilation used to keep a neighborhood resident
    /// during windowed computations.
    pub fn protect_window(&mut self, center: ChunkId, radius: u32) -> Result<(), SwapError> {
        let (n_chunk_rows, n_chunk_cols) = {
            let grid = self.grid(center.grid)?;
            (grid.n_chunk_rows(), grid.n_chunk_cols())
        };
        let row_lo = center.coord.chunk_row.saturating_sub(radius);
        let row_hi = (center.coord.chunk_row.saturating_add(radius)).min(n_chunk_rows - 1);
        let col_lo = center.coord.chunk_col.saturating_sub(radius);
        let col_hi = (center.coord.chunk_col.saturating_add(radius)).min(n_chunk_cols - 1);

        let set = self.protected.entry(center.grid).or_default();
        for chunk_row in row_lo..=row_hi {
            for chunk_col in col_lo..=col_hi {
                set.insert(ChunkCoord::new(chunk_row, chunk_col));
            }
        }
        Ok(())
    }

    /// Pin every currently registered chunk of one grid.
    pub fn protect_grid(&mut self, id: GridId) -> Result<(), SwapError> {
        let coords: Vec<ChunkCoord> = self
            .grid(id)?
            .chunk_ids()
            .into_iter()
            .map(|c| c.coord)
            .collect();
        self.protected.entry(id).or_default().extend(coords);
        Ok(())
    }

    /// Unpin one chunk. Returns whether it was protected.
    pub fn unprotect(&mut self, id: ChunkId) -> bool {
        let Some(set) = self.protected.get_mut(&id.grid) else {
            return false;
        };
        let removed = set.remove(&id.coord);
        if set.is_empty() {
            self.protected.remove(&id.grid);
        }
        removed
    }

    /// Unpin all chunks of one grid.
    pub fn unprotect_grid(&mut self, id: GridId) {
        self.protected.remove(&id);
    }

    /// Unpin everything.
    pub fn clear_protected(&mut self) {
        self.protected.clear();
    }

    pub fn is_protected(&self, id: ChunkId) -> bool {
        self.is_chunk_protected(id)
    }

    /// Total number of pinned chunks across all grids.
    pub fn protected_count(&self) -> usize {
        self.protected.values().map(BTreeSet::len).sum()
    }

    /// Capture the current protected map.
    pub fn protected_snapshot(&self) -> ProtectedSnapshot {
        ProtectedSnapshot {
            entries: self.protected.clone(),
        }
    }

    /// Replace the protected map with a snapshot.
    pub fn restore_protected(&mut self, snapshot: ProtectedSnapshot) {
        self.protected = snapshot.entries;
    }

    /// Union a snapshot into the current protected map.
    pub fn merge_protected(&mut self, snapshot: ProtectedSnapshot) {
        for (grid, coords) in snapshot.entries {
            self.protected.entry(grid).or_default().extend(coords);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Environment, SwapConfig};
    use gridswap_core::{ChunkCoord, ChunkId, GridId, GridSpec};

    fn test_env() -> (tempfile::TempDir, Environment, GridId) {
        let dir = tempfile::tempdir().unwrap();
        let mut env = Environment::new(SwapConfig::new(dir.path())).unwrap();
        let g = env
            .create_grid(GridSpec::new("p", 8, 8).with_chunk_size(2, 2))
            .unwrap();
        (dir, env, g)
    }

    #[test]
    fn test_protect_and_unprotect() {
        let (_dir, mut env, g) = test_env();
        let id = ChunkId::new(g, ChunkCoord::new(1, 1));
        assert!(!env.is_protected(id));
        env.protect(id);
        assert!(env.is_protected(id));
        assert!(env.unprotect(id));
        assert!(!env.unprotect(id));
        assert_eq!(env.protected_count(), 0);
    }

    #[test]
    fn test_window_interior_and_edge() {
        let (_dir, mut env, g) = test_env();
        env.protect_window(ChunkId::new(g, ChunkCoord::new(2, 2)), 1).unwrap();
        assert_eq!(env.protected_count(), 9);
        env.clear_protected();
        env.protect_window(ChunkId::new(g, ChunkCoord::new(0, 0)), 1).unwrap();
        assert_eq!(env.protected_count(), 4);
    }

    #[test]
    fn test_snapshot_restore() {
        let (_dir, mut env, g) = test_env();
        env.protect(ChunkId::new(g, ChunkCoord::new(0, 0)));
        let saved = env.protected_snapshot();
        env.protect(ChunkId::new(g, ChunkCoord::new(0, 1)));
        assert_eq!(env.protected_count(), 2);
        env.restore_protected(saved);
        assert_eq!(env.protected_count(), 1);
        assert!(env.is_protected(ChunkId::new(g, ChunkCoord::new(0, 0))));
    }

    #[test]
    fn test_snapshot_union_dedupes() {
        let (_dir, mut env, g) = test_env();
        env.protect(ChunkId::new(g, ChunkCoord::new(0, 0)));
        let first = env.protected_snapshot();
        env.protect(ChunkId::new(g, ChunkCoord::new(1, 0)));
        let second = env.protected_snapshot();
        let merged = first.union(second);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(ChunkId::new(g, ChunkCoord::new(0, 0))));
    }
}
