use serde::{Deserialize, Serialize};

use cask_crypto::DEFAULT_CHUNK_SIZE;

/// How the usage summary is kept current.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsStrategy {
    /// Rebuild the summary from the full catalog after every write.
    /// O(objects + references) per write, correct by construction.
    #[default]
    Recompute,
    /// Adjust the summary by the delta of each write, under the same digest
    /// lock as the write itself. O(1) per write.
    Incremental,
}

/// Configuration for the deduplication engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How often one ingestion may re-run its decision after racing with a
    /// writer outside this engine before giving up.
    pub max_conflict_retries: u32,
    /// Summary maintenance strategy.
    pub stats_strategy: StatsStrategy,
    /// Read size used while hashing uploads.
    pub chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            stats_strategy: StatsStrategy::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl EngineConfig {
    /// Default configuration with incremental accounting.
    pub fn incremental() -> Self {
        Self {
            stats_strategy: StatsStrategy::Incremental,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = EngineConfig::default();
        assert_eq!(c.max_conflict_retries, 3);
        assert_eq!(c.stats_strategy, StatsStrategy::Recompute);
        assert_eq!(c.chunk_size, 64 * 1024);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let c: EngineConfig = serde_json::from_str(r#"{"stats_strategy":"incremental"}"#).unwrap();
        assert_eq!(c, EngineConfig::incremental());
    }
}
