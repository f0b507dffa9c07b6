//! The memory-pressure recovery protocol.
//!
//! A single reusable wrapper implements the try / evict / retry sequence for
//! every allocation-sensitive operation, instead of duplicating the control
//! flow at each call site:
//!
//! 1. Attempt the operation.
//! 2. On recoverable exhaustion, release the swap reserve so recovery has
//!    headroom.
//! 3. Select one eviction victim by the canonical priority order and evict
//!    it; if nothing is evictable the exhaustion is fatal.
//! 4. Re-prime the reserve and retry from step 1.
//!
//! The chunk the operation is working on is pinned: it is never selected as
//! a victim, even under the desperate fallback, since evicting it would
//! corrupt the very operation being retried. Within one loop the sequence is
//! strictly evict-then-retry, so the retried attempt always observes the
//! freed memory.

use crate::environment::Environment;
use crate::error::SwapError;
use gridswap_core::{ChunkCoord, ChunkId, Grid, GridError, GridId};
use std::rc::Rc;
use tracing::{debug, error, warn};

impl Environment {
    /// Run an allocation-sensitive grid operation with memory-pressure
    /// recovery.
    ///
    /// `pinned` names the chunk the operation reads or writes, if any; it is
    /// excluded from victim selection for the duration. Recoverable
    /// exhaustion never escapes this function: the caller sees the
    /// operation's result, [`SwapError::FatalExhaustion`], or
    /// [`SwapError::RecoveryLimit`].
    pub(crate) fn run_recovered<T>(
        &mut self,
        grid_id: GridId,
        pinned: Option<ChunkCoord>,
        mut op: impl FnMut(&mut Grid) -> Result<T, GridError>,
    ) -> Result<T, SwapError> {
        let pinned = pinned.map(|coord| ChunkId::new(grid_id, coord));
        let limit = self.config().max_recovery_attempts.max(1);
        let mut evicted = 0usize;

        for _ in 0..limit {
            let grid = self.grid_mut(grid_id)?;
            let (requested, free) = match op(grid) {
                Ok(value) => return Ok(value),
                Err(GridError::Exhausted { requested, free }) => (requested, free),
                Err(e) => return Err(e.into()),
            };

            let pool = Rc::clone(self.pool());
            pool.borrow_mut().drop_reserve();

            match self.select_victim(Some(grid_id), pinned, true) {
                Some((victim, desperate)) => {
                    if desperate {
                        warn!(%victim, "evicting a protected chunk; no unprotected candidate left");
                    } else {
                        debug!(%victim, requested, free, "evicting to recover from memory pressure");
                    }
                    self.evict(victim)?;
                    evicted += 1;
                    pool.borrow_mut().prime_reserve();
                }
                None => {
                    let grid_name = self.grid(grid_id)?.name().to_string();
                    error!(
                        grid = %grid_id,
                        evicted,
                        requested,
                        free,
                        "memory exhaustion with nothing left to evict"
                    );
                    return Err(SwapError::FatalExhaustion {
                        grid: grid_name,
                        evicted,
                        requested,
                        free,
                    });
                }
            }
        }

        let grid_name = self.grid(grid_id)?.name().to_string();
        Err(SwapError::RecoveryLimit {
            grid: grid_name,
            limit,
        })
    }
}
