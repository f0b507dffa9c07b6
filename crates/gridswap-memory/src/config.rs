//! Environment configuration.
//!
//! Defaults are tuned for tests and small sessions; production callers set an
//! explicit budget. `from_env` reads `GRIDSWAP_*` variables so binaries can
//! configure a session without code changes.

use crate::error::SwapError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Configuration for a swapping [`Environment`](crate::Environment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Fast-memory budget in bytes.
    pub budget_bytes: usize,
    /// Proactive eviction threshold: sweeps run while free bytes stay below
    /// this. Zero disables proactive eviction.
    pub threshold_bytes: usize,
    /// Size of the swap reserve held back so recovery has headroom.
    pub reserve_bytes: usize,
    /// Directory under which per-grid backing directories are created.
    pub swap_dir: PathBuf,
    /// Cap on recovery attempts per operation; converts pathological retry
    /// into a diagnosable failure.
    pub max_recovery_attempts: usize,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 256 * 1024 * 1024,
            threshold_bytes: 0,
            reserve_bytes: 256 * 1024,
            swap_dir: env::temp_dir().join("gridswap"),
            max_recovery_attempts: 4096,
        }
    }
}

impl SwapConfig {
    pub fn new(swap_dir: impl Into<PathBuf>) -> Self {
        Self {
            swap_dir: swap_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_budget(mut self, bytes: usize) -> Self {
        self.budget_bytes = bytes;
        self
    }

    pub fn with_threshold(mut self, bytes: usize) -> Self {
        self.threshold_bytes = bytes;
        self
    }

    pub fn with_reserve(mut self, bytes: usize) -> Self {
        self.reserve_bytes = bytes;
        self
    }

    pub fn with_recovery_limit(mut self, attempts: usize) -> Self {
        self.max_recovery_attempts = attempts;
        self
    }

    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    ///
    /// Recognized: `GRIDSWAP_BUDGET`, `GRIDSWAP_THRESHOLD`,
    /// `GRIDSWAP_RESERVE` (byte sizes, suffixes allowed), `GRIDSWAP_DIR`,
    /// `GRIDSWAP_RECOVERY_LIMIT`.
    pub fn from_env() -> Result<Self, SwapError> {
        let mut config = Self::default();
        if let Ok(v) = env::var("GRIDSWAP_BUDGET") {
            config.budget_bytes = parse_bytes(&v)?;
        }
        if let Ok(v) = env::var("GRIDSWAP_THRESHOLD") {
            config.threshold_bytes = parse_bytes(&v)?;
        }
        if let Ok(v) = env::var("GRIDSWAP_RESERVE") {
            config.reserve_bytes = parse_bytes(&v)?;
        }
        if let Ok(v) = env::var("GRIDSWAP_DIR") {
            config.swap_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("GRIDSWAP_RECOVERY_LIMIT") {
            config.max_recovery_attempts = v
                .parse()
                .map_err(|_| SwapError::Config(format!("invalid recovery limit '{v}'")))?;
        }
        Ok(config)
    }
}

/// Parse a human-readable byte size: `"512M"`, `"1G"`, `"64K"`, `"1024"`.
/// Case-insensitive, optional trailing `B`.
pub fn parse_bytes(s: &str) -> Result<usize, SwapError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(SwapError::Config("empty byte size".into()));
    }
    let upper = s.to_uppercase();
    let (num, multiplier): (&str, usize) = if let Some(rest) = upper.strip_suffix("GB") {
        (rest, 1 << 30)
    } else if let Some(rest) = upper.strip_suffix('G') {
        (rest, 1 << 30)
    } else if let Some(rest) = upper.strip_suffix("MB") {
        (rest, 1 << 20)
    } else if let Some(rest) = upper.strip_suffix('M') {
        (rest, 1 << 20)
    } else if let Some(rest) = upper.strip_suffix("KB") {
        (rest, 1 << 10)
    } else if let Some(rest) = upper.strip_suffix('K') {
        (rest, 1 << 10)
    } else if let Some(rest) = upper.strip_suffix('B') {
        (rest, 1)
    } else {
        (upper.as_str(), 1)
    };
    let value: usize = num
        .trim()
        .parse()
        .map_err(|_| SwapError::Config(format!("invalid byte size '{s}'")))?;
    value
        .checked_mul(multiplier)
        .ok_or_else(|| SwapError::Config(format!("byte size overflow '{s}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes("1024").unwrap(), 1024);
        assert_eq!(parse_bytes("64K").unwrap(), 64 * 1024);
        assert_eq!(parse_bytes("512M").unwrap(), 512 << 20);
        assert_eq!(parse_bytes("512MB").unwrap(), 512 << 20);
        assert_eq!(parse_bytes("1g").unwrap(), 1 << 30);
        assert_eq!(parse_bytes("16B").unwrap(), 16);
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("12X").is_err());
        assert!(parse_bytes("lots").is_err());
    }

    #[test]
    fn test_builder() {
        let config = SwapConfig::new("/tmp/swap")
            .with_budget(1 << 20)
            .with_threshold(4096)
            .with_reserve(512)
            .with_recovery_limit(8);
        assert_eq!(config.budget_bytes, 1 << 20);
        assert_eq!(config.threshold_bytes, 4096);
        assert_eq!(config.reserve_bytes, 512);
        assert_eq!(config.max_recovery_attempts, 8);
        assert_eq!(config.swap_dir, PathBuf::from("/tmp/swap"));
    }
}
