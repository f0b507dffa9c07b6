//! Byte-accounted fast-memory ledger shared by an environment and its grids.
//!
//! "Fast memory" is modeled as an explicit budget rather than a probe of OS
//! free RAM: chunk stores report their footprint, charges happen before any
//! allocation, and releases follow eviction. This keeps exhaustion, threshold
//! sweeps, and victim selection deterministic and testable.
//!
//! The ledger also tracks the swap reserve: a small block of bytes held back
//! so that recovery has headroom to run even while the main pool is full. The
//! reserve counts as used while held; dropping it is what frees the headroom.

use crate::error::GridError;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a [`FastMemory`] ledger.
///
/// The swapping protocol is single-threaded and cooperative, so plain
/// `Rc<RefCell<_>>` sharing is sufficient; borrows are scoped per call and
/// never held across chunk I/O.
pub type PoolHandle = Rc<RefCell<FastMemory>>;

/// The fast-memory ledger: budget, usage, reserve, and eviction threshold.
#[derive(Debug)]
pub struct FastMemory {
    /// Hard ceiling in bytes.
    budget: usize,
    /// Bytes currently charged, including any held reserve.
    used: usize,
    /// Bytes currently held as the swap reserve.
    reserve: usize,
    /// Size the reserve is re-primed to after recovery.
    reserve_size: usize,
    /// Proactive eviction kicks in when free bytes drop below this.
    threshold: usize,
}

impl FastMemory {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            reserve: 0,
            reserve_size: 0,
            threshold: 0,
        }
    }

    /// Create a ledger wrapped in a shared handle.
    pub fn shared(budget: usize) -> PoolHandle {
        Rc::new(RefCell::new(Self::new(budget)))
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Adjust the budget. Shrinking below current usage is allowed; the pool
    /// simply reports zero free bytes until enough is released.
    pub fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    /// Bytes currently charged (resident chunk stores plus held reserve).
    pub fn used(&self) -> usize {
        self.used
    }

    /// Bytes available for new charges.
    pub fn free(&self) -> usize {
        self.budget.saturating_sub(self.used)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Whether free memory has dropped below the eviction threshold.
    pub fn below_threshold(&self) -> bool {
        self.free() < self.threshold
    }

    /// Charge `bytes` against the budget, or signal recoverable exhaustion.
    pub fn try_charge(&mut self, bytes: usize) -> Result<(), GridError> {
        if bytes > self.free() {
            return Err(GridError::Exhausted {
                requested: bytes,
                free: self.free(),
            });
        }
        self.used += bytes;
        Ok(())
    }

    /// Return `bytes` to the pool.
    pub fn release(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }

    pub fn reserve_size(&self) -> usize {
        self.reserve_size
    }

    pub fn set_reserve_size(&mut self, bytes: usize) {
        self.reserve_size = bytes;
    }

    /// Whether the reserve is currently held.
    pub fn has_reserve(&self) -> bool {
        self.reserve > 0
    }

    /// Release the held reserve, returning how many bytes were freed.
    pub fn drop_reserve(&mut self) -> usize {
        let freed = self.reserve;
        self.used = self.used.saturating_sub(freed);
        self.reserve = 0;
        freed
    }

    /// Re-establish the reserve if the budget allows. Returns whether the
    /// reserve is held afterwards.
    pub fn prime_reserve(&mut self) -> bool {
        if self.reserve >= self.reserve_size {
            return true;
        }
        let needed = self.reserve_size - self.reserve;
        if needed > self.free() {
            return false;
        }
        self.used += needed;
        self.reserve = self.reserve_size;
        true
    }
}
