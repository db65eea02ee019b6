//! Collaborator traits the race engine depends on.
//!
//! Chat transport, the discovery HTTP client, the tracked-race store and the
//! results destination all live outside this crate. Races talk to them only
//! through these traits, bundled into [`Services`]. In-memory implementations
//! for local runs and tests are in [`crate::providers::memory`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::Result;
use crate::discovery::RaceListing;

/// Source of race listings.
///
/// Failures mean "no update this cycle"; callers keep their last known state.
#[async_trait::async_trait]
pub trait DiscoverySource: Send + Sync + 'static {
    /// Fetch one race by id.
    ///
    /// Returns:
    /// - `Ok(Some(race))` - Race found
    /// - `Ok(None)` - No race with this id
    /// - `Err(e)` - Source unreachable or payload malformed
    async fn fetch_race(&self, race_id: &str) -> Result<Option<RaceListing>>;

    /// List every race the source currently knows.
    async fn list_races(&self) -> Result<Vec<RaceListing>>;
}

/// A chat network the engine can join, leave and post to.
///
/// Failures are logged by the caller and never retried.
#[async_trait::async_trait]
pub trait ChatRelay: Send + Sync + 'static {
    async fn subscribe(&self, channel: &str) -> Result<()>;

    async fn unsubscribe(&self, channel: &str) -> Result<()>;

    async fn publish(&self, text: &str, channel: &str) -> Result<()>;
}

/// Key-existence store of tracked races and their finished flag.
#[async_trait::async_trait]
pub trait RaceStore: Send + Sync + 'static {
    async fn mark_tracked(&self, race_id: &str) -> Result<()>;

    async fn mark_finished(&self, race_id: &str, finished: bool) -> Result<()>;

    async fn is_tracked(&self, race_id: &str) -> Result<bool>;

    async fn is_finished(&self, race_id: &str) -> Result<bool>;

    async fn remove(&self, race_id: &str) -> Result<()>;

    /// Remove every unfinished race and return how many were removed.
    async fn remove_unfinished(&self) -> Result<usize>;
}

/// Chat handles that must never receive announcements.
#[async_trait::async_trait]
pub trait Blacklist: Send + Sync + 'static {
    async fn is_blacklisted(&self, handle: &str) -> bool;

    async fn add(&self, handle: &str) -> Result<()>;

    async fn remove(&self, handle: &str) -> Result<()>;
}

/// Handle of a posted record message, used to edit it later.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub channel: String,
    pub id: u64,
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel, self.id)
    }
}

/// Destination for race results.
///
/// The live feed receives a plain post; the record feed keeps an editable
/// message so late comments can be folded in.
#[async_trait::async_trait]
pub trait ResultPublisher: Send + Sync + 'static {
    async fn post_live(&self, text: &str) -> Result<()>;

    async fn post_record(&self, text: &str) -> Result<MessageHandle>;

    async fn edit_record(&self, handle: &MessageHandle, text: &str) -> Result<()>;
}

/// Which races currently rely on each chat channel.
///
/// Several races can relay to the same channel; it is only unsubscribed once
/// the last of them lets go.
#[derive(Debug, Clone, Default)]
pub struct ChannelLeases {
    inner: Arc<Mutex<HashMap<String, BTreeSet<String>>>>,
}

impl ChannelLeases {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, channel: &str, race_id: &str) {
        let mut leases = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        leases.entry(channel.to_string()).or_default().insert(race_id.to_string());
    }

    /// Drop `race_id`'s lease on `channel`.
    ///
    /// Returns true when no other race still holds the channel.
    pub fn release(&self, channel: &str, race_id: &str) -> bool {
        let mut leases = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(holders) = leases.get_mut(channel) else {
            return true;
        };
        holders.remove(race_id);
        if holders.is_empty() {
            leases.remove(channel);
            true
        } else {
            false
        }
    }

    pub fn is_leased(&self, channel: &str) -> bool {
        let leases = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        leases.contains_key(channel)
    }
}

/// Collaborators shared by every race.
#[derive(Clone)]
pub struct Services {
    pub discovery: Arc<dyn DiscoverySource>,
    /// Viewer-facing chat.
    pub chat: Arc<dyn ChatRelay>,
    /// Livesplit relay carrying split events.
    pub split_feed: Arc<dyn ChatRelay>,
    pub store: Arc<dyn RaceStore>,
    pub blacklist: Arc<dyn Blacklist>,
    pub results: Arc<dyn ResultPublisher>,
    pub leases: ChannelLeases,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").field("leases", &self.leases).finish_non_exhaustive()
    }
}
