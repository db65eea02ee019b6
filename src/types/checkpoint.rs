//! Checkpoints and the ordered catalog a race is tracked against.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{RaceError, Result};

/// Name of the checkpoint that marks a runner's finish.
pub const TERMINAL_CHECKPOINT: &str = "Done";
/// Name of the pseudo-checkpoint reported for forfeited runners.
pub const FORFEIT_CHECKPOINT: &str = "Forfeit";
/// Name of the pseudo-checkpoint reported before a runner's first split.
pub const NO_PROGRESS_CHECKPOINT: &str = "N/A";

/// A named, positionally ordered milestone.
///
/// Identity is `(position, name)`; aliases only widen matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    position: i32,
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
}

impl Checkpoint {
    pub fn new(position: i32, name: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            position,
            name: name.into(),
            aliases: aliases.iter().map(|alias| alias.to_string()).collect(),
        }
    }

    /// Synthetic checkpoint reported as a forfeited runner's latest split.
    pub fn forfeit() -> Self {
        Self::new(-1, FORFEIT_CHECKPOINT, &[])
    }

    /// Synthetic checkpoint reported before any real split.
    pub fn no_progress() -> Self {
        Self::new(0, NO_PROGRESS_CHECKPOINT, &[])
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn is_terminal(&self) -> bool {
        self.name == TERMINAL_CHECKPOINT
    }

    /// Case-insensitive match against the canonical name or any alias.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.name.to_lowercase() == name || self.aliases.iter().any(|alias| alias.to_lowercase() == name)
    }
}

impl PartialEq for Checkpoint {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.name == other.name
    }
}

impl Eq for Checkpoint {}

impl Hash for Checkpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.position.hash(state);
        self.name.hash(state);
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - Position: {}", self.name, self.position)
    }
}

/// Ordered, immutable list of checkpoints for one game category.
#[derive(Debug, Clone)]
pub struct SplitCatalog {
    checkpoints: Vec<Checkpoint>,
    terminal: usize,
}

impl SplitCatalog {
    /// Build a catalog, rejecting duplicate positions or names and requiring
    /// a `Done` checkpoint.
    pub fn new(checkpoints: Vec<Checkpoint>) -> Result<Self> {
        let mut positions = HashSet::new();
        let mut names = HashSet::new();
        for checkpoint in &checkpoints {
            if !positions.insert(checkpoint.position) {
                return Err(RaceError::config(format!(
                    "duplicate checkpoint position {}",
                    checkpoint.position
                )));
            }
            if !names.insert(checkpoint.name.to_lowercase()) {
                return Err(RaceError::config(format!("duplicate checkpoint name {}", checkpoint.name)));
            }
        }

        let terminal = checkpoints
            .iter()
            .position(Checkpoint::is_terminal)
            .ok_or_else(|| RaceError::config(format!("catalog has no {TERMINAL_CHECKPOINT} checkpoint")))?;

        Ok(Self { checkpoints, terminal })
    }

    /// Pokémon Red/Blue any% glitchless.
    pub fn pokemon_red_blue() -> Self {
        let checkpoints = vec![
            Checkpoint::forfeit(),
            Checkpoint::no_progress(),
            Checkpoint::new(1, "Rival 1", &["Rival", "Blue 1", "Gary 1", "Leave Lab"]),
            Checkpoint::new(2, "Nidoran", &["Nido", "NidoranM"]),
            Checkpoint::new(3, "Brock", &[]),
            Checkpoint::new(4, "Route 3", &["Route 03", "Rt 3", "Rt. 3", "Rt. 03"]),
            Checkpoint::new(5, "Mt. Moon", &["Mt Moon", "Moon"]),
            Checkpoint::new(6, "Nugget Bridge", &["Bridge"]),
            Checkpoint::new(7, "Misty", &[]),
            Checkpoint::new(8, "Surge", &["Lt Surge", "Lt. Surge"]),
            Checkpoint::new(9, "Fly", &["HM02", "HM 02", "HM Fly"]),
            Checkpoint::new(10, "Flute", &["PokeFlute", "Poke Flute"]),
            Checkpoint::new(11, "Koga", &[]),
            Checkpoint::new(12, "Erika", &[]),
            Checkpoint::new(13, "Blaine", &[]),
            Checkpoint::new(14, "Sabrina", &[]),
            Checkpoint::new(15, "Giovanni", &["Gio 2"]),
            Checkpoint::new(16, "Lorelei", &[]),
            Checkpoint::new(17, "Bruno", &[]),
            Checkpoint::new(18, "Agatha", &[]),
            Checkpoint::new(19, "Lance", &[]),
            Checkpoint::new(20, "Champion", &["Champ", "Blue"]),
            Checkpoint::new(21, "Hall of Fame", &["HoF", "End"]),
            Checkpoint::new(100, TERMINAL_CHECKPOINT, &[]),
        ];
        let terminal = checkpoints.len() - 1;
        Self { checkpoints, terminal }
    }

    /// Look up a checkpoint by name or alias.
    pub fn get(&self, name: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|checkpoint| checkpoint.matches(name))
    }

    /// Look up a checkpoint by its index in catalog order.
    pub fn by_index(&self, index: usize) -> Option<&Checkpoint> {
        self.checkpoints.get(index)
    }

    pub fn terminal(&self) -> &Checkpoint {
        &self.checkpoints[self.terminal]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter()
    }

    /// Checkpoints runners actually report, excluding the pseudo-checkpoints.
    pub fn reportable(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.iter().filter(|checkpoint| checkpoint.position > 0)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

impl Default for SplitCatalog {
    fn default() -> Self {
        Self::pokemon_red_blue()
    }
}
