//! Engine configuration
//!
//! Loaded from a JSON file. Every field but `data_dir` has a default, and
//! `EngineConfig::default()` is valid on its own:
//!
//! ```json
//! {
//!   "data_dir": "./chrono-data",
//!   "level_bits": 2,
//!   "leaf_row_limit": 1024,
//!   "bloom_bits": 2048,
//!   "oversized_leaf_policy": "allow"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{ChronoError, ChronoResult};
use crate::trie::Bucketer;

/// What the trie writer does with a leaf that is still over the row limit
/// because every row belongs to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OversizedLeafPolicy {
    /// Write the oversized leaf and log a warning
    #[default]
    Allow,
    /// Fail the write with `ResourceExhausted`
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding persisted segments
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Bits of the iid consumed per trie level; fan-out is `2^level_bits`
    #[serde(default = "default_level_bits")]
    pub level_bits: u8,

    /// Maximum rows per leaf page
    #[serde(default = "default_leaf_row_limit")]
    pub leaf_row_limit: usize,

    /// Size of each page's iid bloom filter in bits
    #[serde(default = "default_bloom_bits")]
    pub bloom_bits: usize,

    #[serde(default)]
    pub oversized_leaf_policy: OversizedLeafPolicy,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./chrono-data")
}
fn default_level_bits() -> u8 {
    2
}
fn default_leaf_row_limit() -> usize {
    1024
}
fn default_bloom_bits() -> usize {
    2048
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            level_bits: default_level_bits(),
            leaf_row_limit: default_leaf_row_limit(),
            bloom_bits: default_bloom_bits(),
            oversized_leaf_policy: OversizedLeafPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ChronoResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| ChronoError::io(format!("reading config {}", path.display()), e))?;

        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| ChronoError::config(format!("invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> ChronoResult<()> {
        if !matches!(self.level_bits, 2 | 4 | 8) {
            return Err(ChronoError::config(format!(
                "level_bits must be 2, 4 or 8, got {}",
                self.level_bits
            )));
        }

        if self.leaf_row_limit == 0 {
            return Err(ChronoError::config("leaf_row_limit must be > 0"));
        }

        if self.bloom_bits < 64 || !self.bloom_bits.is_power_of_two() {
            return Err(ChronoError::config(format!(
                "bloom_bits must be a power of two >= 64, got {}",
                self.bloom_bits
            )));
        }

        Ok(())
    }

    /// Bucketer for the configured level width
    pub fn bucketer(&self) -> ChronoResult<Bucketer> {
        Bucketer::new(self.level_bits)
    }

    /// Directory of the persisted segment `name`
    pub fn segment_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn with_leaf_row_limit(mut self, leaf_row_limit: usize) -> Self {
        self.leaf_row_limit = leaf_row_limit;
        self
    }

    pub fn with_level_bits(mut self, level_bits: u8) -> Self {
        self.level_bits = level_bits;
        self
    }

    pub fn with_bloom_bits(mut self, bloom_bits: usize) -> Self {
        self.bloom_bits = bloom_bits;
        self
    }

    pub fn with_oversized_leaf_policy(mut self, policy: OversizedLeafPolicy) -> Self {
        self.oversized_leaf_policy = policy;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }
}
