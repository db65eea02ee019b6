//! One race participant and its recorded splits.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::discovery::{Entrant, EntrantStatus};
use crate::types::{Checkpoint, Timestamp};

/// A race entrant as tracked by one race.
///
/// Identity is the display name plus the lowercased chat handle. Splits are
/// stored as reported; catalog validation happens before they reach here.
#[derive(Debug, Clone)]
pub struct Runner {
    name: String,
    handle: String,
    forfeited: bool,
    finished: bool,
    ignored: bool,
    message: String,
    splits: HashMap<Checkpoint, Timestamp>,
    watched: BTreeSet<String>,
    announced_watched: HashSet<String>,
}

impl Runner {
    pub fn new(name: impl Into<String>, handle: &str) -> Self {
        Self {
            name: name.into(),
            handle: handle.to_lowercase(),
            forfeited: false,
            finished: false,
            ignored: false,
            message: String::new(),
            splits: HashMap::new(),
            watched: BTreeSet::new(),
            announced_watched: HashSet::new(),
        }
    }

    /// Create a runner from its discovery entry.
    ///
    /// A runner that joins already forfeited starts forfeited but is not
    /// marked finished until its status is next applied.
    pub fn from_entrant(entrant: &Entrant) -> Self {
        let mut runner = Self::new(entrant.display_name.clone(), &entrant.chat_handle);
        runner.forfeited = entrant.status.is_forfeit();
        runner.message = entrant.message.clone();
        runner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lowercased chat handle, empty when the entrant has none linked.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    pub fn is_forfeited(&self) -> bool {
        self.forfeited
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = message.into();
    }

    pub fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }

    pub(crate) fn mark_finished(&mut self) {
        self.finished = true;
    }

    /// Apply an external status. Forfeiting also finishes; nothing clears
    /// `finished`.
    pub fn update_status(&mut self, status: &EntrantStatus) {
        self.forfeited = status.is_forfeit();
        if self.forfeited {
            self.finished = true;
        }
    }

    pub fn record_split(&mut self, checkpoint: &Checkpoint, timestamp: Timestamp) {
        self.splits.insert(checkpoint.clone(), timestamp);
    }

    pub fn remove_split(&mut self, checkpoint: &Checkpoint) -> Option<Timestamp> {
        self.splits.remove(checkpoint)
    }

    /// Whether anything, including a skip, is recorded for `checkpoint`.
    pub fn has_split(&self, checkpoint: &Checkpoint) -> bool {
        self.splits.contains_key(checkpoint)
    }

    pub fn has_any_split(&self) -> bool {
        !self.splits.is_empty()
    }

    /// Time shown for `checkpoint`: forfeit beats ignore beats the stored value.
    pub fn split_time_for(&self, checkpoint: &Checkpoint) -> Option<Timestamp> {
        if self.forfeited {
            return Some(Timestamp::Forfeited);
        }
        if self.ignored {
            return Some(Timestamp::Blank);
        }
        self.splits.get(checkpoint).cloned()
    }

    /// Furthest checkpoint reached, ignoring skips.
    pub fn latest_completed(&self) -> (Checkpoint, Timestamp) {
        if self.forfeited {
            return (Checkpoint::forfeit(), Timestamp::Forfeited);
        }
        self.splits
            .iter()
            .filter(|(_, timestamp)| !timestamp.is_skipped())
            .max_by_key(|(checkpoint, _)| checkpoint.position())
            .map(|(checkpoint, timestamp)| (checkpoint.clone(), timestamp.clone()))
            .unwrap_or_else(|| (Checkpoint::no_progress(), Timestamp::Blank))
    }

    /// Sort key for overall standings: furthest first, then fastest, then name.
    pub fn latest_progress_key(&self) -> (i32, u64, String) {
        let (checkpoint, timestamp) = self.latest_completed();
        (-checkpoint.position(), timestamp.ordering_value(), self.name.clone())
    }

    /// Sort key for standings at one checkpoint.
    pub fn fixed_checkpoint_key(&self, checkpoint: &Checkpoint) -> (u64, String) {
        let order = self
            .split_time_for(checkpoint)
            .map_or(u64::MAX, |timestamp| timestamp.ordering_value());
        (order, self.name.clone())
    }

    /// Case-insensitive match on display name or chat handle.
    pub fn matches(&self, alias: &str) -> bool {
        let alias = alias.trim().to_lowercase();
        self.name.to_lowercase() == alias || (!self.handle.is_empty() && self.handle == alias)
    }

    /// `<name>: (<detail>)` line used in overall standings.
    pub fn standing_line(&self, finished_mode: bool, with_comments: bool) -> String {
        let (checkpoint, timestamp) = self.latest_completed();
        let detail = if finished_mode && !self.finished {
            "N/A".to_string()
        } else if timestamp.is_concrete() && !finished_mode {
            format!("{} {}", checkpoint.name(), timestamp.time_string())
        } else {
            timestamp.time_string()
        };

        let mut line = format!("{}: ({})", self.name, detail);
        if with_comments && !self.message.is_empty() {
            line.push_str(&format!(" ({})", self.message));
        }
        line
    }

    /// `<name> - <time>` entry used in split standings.
    pub fn split_line(&self, checkpoint: &Checkpoint) -> Option<String> {
        self.split_time_for(checkpoint)
            .map(|timestamp| format!("{} - {}", self.name, timestamp.time_string()))
    }

    pub fn watched(&self) -> &BTreeSet<String> {
        &self.watched
    }

    pub fn set_watched(&mut self, watched: BTreeSet<String>) {
        self.watched = watched;
    }

    pub(crate) fn has_announced_watched(&self, checkpoint: &str) -> bool {
        self.announced_watched.contains(checkpoint)
    }

    pub(crate) fn mark_announced_watched(&mut self, checkpoint: &str) {
        self.announced_watched.insert(checkpoint.to_string());
    }
}

impl fmt::Display for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Runner: {}, Forfeit: {}", self.handle, self.forfeited)
    }
}
