//! Tracker configuration loaded from YAML.
//!
//! ```yaml
//! game_id: 6
//! mailbox_capacity: 64
//! comment_refresh:
//!   delay_secs: 60
//!   count: 2
//! catalog:
//!   - { position: 1, name: Brock }
//!   - { position: 100, name: Done }
//! ```
//!
//! Every field is optional. Without a `catalog` the built-in Pokémon Red/Blue
//! catalog is used.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::race::RaceSettings;
use crate::types::{Checkpoint, SplitCatalog};

/// Deferred comment refresh after a race finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentRefresh {
    pub delay_secs: u64,
    pub count: u32,
}

impl Default for CommentRefresh {
    fn default() -> Self {
        Self { delay_secs: 60, count: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Only races of this game are watched.
    pub game_id: u32,
    pub comment_refresh: CommentRefresh,
    /// Bound of each race's event queue.
    pub mailbox_capacity: usize,
    pub catalog: Option<Vec<Checkpoint>>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { game_id: 6, comment_refresh: CommentRefresh::default(), mailbox_capacity: 64, catalog: None }
    }
}

impl TrackerConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tracker config {}", path.display()))?;
        let config = Self::from_yaml(&yaml).with_context(|| format!("invalid tracker config {}", path.display()))?;
        config.catalog().with_context(|| format!("invalid checkpoint catalog in {}", path.display()))?;
        Ok(config)
    }

    /// The configured catalog, or the built-in one.
    pub fn catalog(&self) -> Result<SplitCatalog> {
        match &self.catalog {
            Some(checkpoints) => SplitCatalog::new(checkpoints.clone()),
            None => Ok(SplitCatalog::pokemon_red_blue()),
        }
    }

    pub fn race_settings(&self) -> RaceSettings {
        RaceSettings {
            comment_refresh_delay: Duration::from_secs(self.comment_refresh.delay_secs),
            comment_refresh_count: self.comment_refresh.count,
        }
    }
}
