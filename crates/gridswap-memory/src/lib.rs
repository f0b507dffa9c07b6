//! Memory-reservation and chunk-swapping subsystem for GridSwap.
//!
//! An [`Environment`] tracks a working set of registered grids, decides which
//! chunks may be evicted under memory pressure while honoring per-operation
//! protected sets, and retries allocation-sensitive operations after evicting.
//! Grids come from `gridswap-core`; this crate supplies the policy.
//!
//! # Example
//! ```
//! use gridswap_core::GridSpec;
//! use gridswap_memory::{Environment, SwapConfig};
//!
//! let dir = std::env::temp_dir().join("gridswap-doc");
//! let mut env = Environment::new(SwapConfig::new(&dir)).unwrap();
//! let grid = env
//!     .create_grid(GridSpec::new("elevation", 4, 4).with_chunk_size(2, 2))
//!     .unwrap();
//! env.set_cell(grid, 0, 0, 5.0).unwrap();
//! assert_eq!(env.cell(grid, 0, 0).unwrap(), 5.0);
//! assert_eq!(env.cell(grid, 3, 1).unwrap(), -9999.0);
//! ```

pub mod config;
pub mod environment;
pub mod error;
mod protect;
mod recover;
mod swap;

pub use config::{parse_bytes, SwapConfig};
pub use environment::Environment;
pub use error::SwapError;
pub use protect::ProtectedSnapshot;
pub use swap::SwapReport;
