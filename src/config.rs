//! Runtime configuration for stores and expansion runs.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Overflow links are 32-bit with one sentinel value.
pub const MAX_OVERFLOW_RECORDS: u64 = u32::MAX as u64;

/// Sizing of one record store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Primary bucket count; any value >= 1 (tests use a single bucket).
    pub buckets: usize,
    /// Records per overflow arena block.
    pub arena_block: usize,
    /// Maximum number of overflow arena blocks.
    pub max_arenas: usize,
}

impl StoreConfig {
    pub fn with_bucket_bits(bits: u32) -> Self {
        Self {
            buckets: 1usize << bits,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buckets == 0 {
            return Err(ConfigError::ZeroBuckets);
        }
        if self.arena_block == 0 || self.max_arenas == 0 {
            return Err(ConfigError::ZeroArenas);
        }
        let space = (self.arena_block as u64).saturating_mul(self.max_arenas as u64);
        if space > MAX_OVERFLOW_RECORDS {
            return Err(ConfigError::OverflowSpace(space));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            buckets: 1 << 20,
            arena_block: 1 << 20,
            max_arenas: 16,
        }
    }
}

/// Settings of an expansion run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DedupConfig {
    /// Directory holding `uniques_<depth>.dat` files.
    pub data_dir: PathBuf,
    pub store: StoreConfig,
    /// Hash-space partitions per expansion pass; each is one full stream of
    /// the previous depth and one store in memory.
    pub partitions: u32,
}

impl DedupConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        if self.partitions == 0 {
            return Err(ConfigError::ZeroPartitions);
        }
        Ok(())
    }
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("uniques"),
            store: StoreConfig::default(),
            partitions: 1,
        }
    }
}
