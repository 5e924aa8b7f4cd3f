//! Multi-store configuration.

use serde::{Deserialize, Serialize};

/// Pruning strategy forwarded to versioned substores at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PruningStrategy {
    /// Keep every version forever.
    Nothing,
    /// Keep the most recent versions and periodic checkpoints
    /// (100 recent, every 100th, pruning applied every 10th commit).
    Default,
    /// Keep only the current version.
    Everything,
    /// Custom retention.
    Custom {
        /// Number of most-recent versions to retain.
        keep_recent: i64,
        /// Retain every Nth version as a checkpoint (0 = none).
        keep_every: i64,
        /// Apply pruning every Nth commit.
        interval: i64,
    },
}

impl Default for PruningStrategy {
    fn default() -> Self {
        Self::Nothing
    }
}

impl PruningStrategy {
    /// Number of most-recent versions retained.
    pub fn keep_recent(&self) -> i64 {
        match self {
            Self::Nothing => i64::MAX,
            Self::Default => 100,
            Self::Everything => 1,
            Self::Custom { keep_recent, .. } => *keep_recent,
        }
    }

    /// Checkpoint interval: every Nth version is kept regardless of age
    /// (0 disables checkpoints).
    pub fn keep_every(&self) -> i64 {
        match self {
            Self::Nothing => 1,
            Self::Default => 100,
            Self::Everything => 0,
            Self::Custom { keep_every, .. } => *keep_every,
        }
    }

    /// How often pruning runs: every Nth commit (0 = never).
    pub fn interval(&self) -> i64 {
        match self {
            Self::Nothing => 0,
            Self::Default => 10,
            Self::Everything => 1,
            Self::Custom { interval, .. } => *interval,
        }
    }

    /// Whether `version` may be deleted once `latest` is committed.
    pub fn should_prune(&self, version: i64, latest: i64) -> bool {
        if matches!(self, Self::Nothing) {
            return false;
        }
        if latest - version < self.keep_recent() {
            return false;
        }
        let keep_every = self.keep_every();
        !(keep_every > 0 && version % keep_every == 0)
    }
}

/// Options recognised by the multi-store at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Pruning strategy for versioned substores.
    #[serde(default)]
    pub pruning: PruningStrategy,
    /// Open versioned substores lazily at load.
    #[serde(default)]
    pub lazy_loading: bool,
}
