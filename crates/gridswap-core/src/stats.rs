//! Delta-notification hook for attached statistics consumers.
//!
//! `Grid::set_cell` notifies an attached [`CellObserver`] with the old and new
//! value of every mutated cell, so aggregates can update incrementally instead
//! of rescanning the grid. The statistics algorithms themselves live outside
//! this crate; [`RunningStats`] is the small reference consumer used in tests.

use crate::chunk::same_value;
use std::cell::RefCell;
use std::rc::Rc;

/// Receives one notification per mutated cell.
pub trait CellObserver {
    /// Called after a cell changed from `old` to `new`.
    fn cell_changed(&mut self, row: u64, col: u64, old: f64, new: f64);
}

/// Shared observer handle attachable to a grid.
pub type ObserverHandle = Rc<RefCell<dyn CellObserver>>;

/// Incrementally maintained aggregate over a grid's non-no-data cells.
///
/// Count and sum are exact under deltas when the observer is attached before
/// the first write; cells written earlier are unobserved, and overwriting one
/// only records the new value. Min and max are only maintained on additions;
/// removing a cell that held the current extreme invalidates them until
/// recomputed by the consumer (they read back as `None`).
#[derive(Debug, Clone)]
pub struct RunningStats {
    no_data: f64,
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl RunningStats {
    pub fn new(no_data: f64) -> Self {
        Self {
            no_data,
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
        }
    }

    /// Create a stats consumer wrapped in a shared observer handle.
    pub fn shared(no_data: f64) -> Rc<RefCell<RunningStats>> {
        Rc::new(RefCell::new(Self::new(no_data)))
    }

    /// Number of cells currently holding a non-no-data value.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Smallest observed value, if still valid.
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    /// Largest observed value, if still valid.
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

impl CellObserver for RunningStats {
    fn cell_changed(&mut self, _row: u64, _col: u64, old: f64, new: f64) {
        // An old value with nothing counted predates this observer
        if !same_value(old, self.no_data) && self.count > 0 {
            self.count -= 1;
            self.sum -= old;
            // Removing an extreme invalidates it until recomputed
            if self.min == Some(old) {
                self.min = None;
            }
            if self.max == Some(old) {
                self.max = None;
            }
        }
        if !same_value(new, self.no_data) {
            self.count += 1;
            self.sum += new;
            self.min = match self.min {
                Some(m) => Some(m.min(new)),
                None if self.count == 1 => Some(new),
                None => None,
            };
            self.max = match self.max {
                Some(m) => Some(m.max(new)),
                None if self.count == 1 => Some(new),
                None => None,
            };
        }
    }
}
