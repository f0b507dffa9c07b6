use gridswap_core::{GridError, GridId};
use thiserror::Error;

/// Errors surfaced by the swapping environment.
///
/// Recoverable memory pressure never appears here: the retry protocol
/// consumes [`GridError::Exhausted`] internally, and callers only ever see a
/// successful result or one of these.
#[derive(Debug, Error)]
pub enum SwapError {
    /// Memory pressure with nothing left to evict anywhere in the registry.
    ///
    /// Carries enough context to tell a genuinely oversized working set from
    /// a policy bug (everything wrongly protected): which grid was operating,
    /// how many chunks recovery had already evicted, and the pool state at
    /// the final failed attempt.
    #[error(
        "fatal memory exhaustion in grid '{grid}': requested {requested} bytes with {free} free \
         and nothing left to evict ({evicted} chunks already swapped)"
    )]
    FatalExhaustion {
        grid: String,
        evicted: usize,
        requested: usize,
        free: usize,
    },

    /// The recovery loop hit its configured attempt cap without the retried
    /// operation succeeding.
    #[error("recovery attempt limit ({limit}) reached in grid '{grid}'")]
    RecoveryLimit { grid: String, limit: usize },

    /// The grid handle does not refer to a registered grid.
    #[error("unknown grid {0}")]
    UnknownGrid(GridId),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A non-recoverable storage-layer failure (corrupt chunk, I/O).
    #[error(transparent)]
    Grid(#[from] GridError),
}
