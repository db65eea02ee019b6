//! In-memory collaborators for local runs and tests.
//!
//! Every type records what was asked of it so callers can inspect the calls
//! afterwards, and every one except the blacklist can be told to fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::discovery::RaceListing;
use crate::provider::{
    Blacklist, ChannelLeases, ChatRelay, DiscoverySource, MessageHandle, RaceStore, ResultPublisher,
    Services,
};
use crate::{RaceError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Discovery source serving a settable set of races.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    races: Mutex<BTreeMap<String, RaceListing>>,
    unavailable: AtomicBool,
    fetches: AtomicUsize,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_race(race: RaceListing) -> Self {
        let discovery = Self::new();
        discovery.set_race(race);
        discovery
    }

    /// Insert or replace a race.
    pub fn set_race(&self, race: RaceListing) {
        lock(&self.races).insert(race.id.clone(), race);
    }

    /// Mutate a stored race in place. Returns false when it is unknown.
    pub fn update_race<F>(&self, race_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut RaceListing),
    {
        match lock(&self.races).get_mut(race_id) {
            Some(race) => {
                update(race);
                true
            }
            None => false,
        }
    }

    pub fn remove_race(&self, race_id: &str) {
        lock(&self.races).remove(race_id);
    }

    /// Make every call fail as if the source were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `fetch_race` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RaceError::upstream("discovery source marked unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl DiscoverySource for StaticDiscovery {
    async fn fetch_race(&self, race_id: &str) -> Result<Option<RaceListing>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(lock(&self.races).get(race_id).cloned())
    }

    async fn list_races(&self) -> Result<Vec<RaceListing>> {
        self.check_available()?;
        Ok(lock(&self.races).values().cloned().collect())
    }
}

/// One call made against a [`MemoryChatRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCall {
    Subscribe(String),
    Unsubscribe(String),
    Publish { channel: String, text: String },
}

/// Chat relay that records subscriptions and deliveries.
#[derive(Debug, Default)]
pub struct MemoryChatRelay {
    calls: Mutex<Vec<RelayCall>>,
    subscribed: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryChatRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call for `channel` fail with a delivery error.
    pub fn fail_channel(&self, channel: &str) {
        lock(&self.failing).insert(channel.to_string());
    }

    pub fn calls(&self) -> Vec<RelayCall> {
        lock(&self.calls).clone()
    }

    /// Channels currently subscribed.
    pub fn subscribed(&self) -> HashSet<String> {
        lock(&self.subscribed).clone()
    }

    pub fn is_subscribed(&self, channel: &str) -> bool {
        lock(&self.subscribed).contains(channel)
    }

    /// `(channel, text)` of every successful publish, in order.
    pub fn published(&self) -> Vec<(String, String)> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                RelayCall::Publish { channel, text } => Some((channel.clone(), text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn publish_count(&self) -> usize {
        self.count(|call| matches!(call, RelayCall::Publish { .. }))
    }

    pub fn subscribe_count(&self) -> usize {
        self.count(|call| matches!(call, RelayCall::Subscribe(_)))
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.count(|call| matches!(call, RelayCall::Unsubscribe(_)))
    }

    /// Forget recorded calls, keeping subscriptions.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn count(&self, predicate: impl Fn(&RelayCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    fn check(&self, channel: &str) -> Result<()> {
        if lock(&self.failing).contains(channel) {
            Err(RaceError::delivery(channel, "channel marked as failing"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ChatRelay for MemoryChatRelay {
    async fn subscribe(&self, channel: &str) -> Result<()> {
        self.check(channel)?;
        trace!(channel, "subscribe");
        lock(&self.subscribed).insert(channel.to_string());
        lock(&self.calls).push(RelayCall::Subscribe(channel.to_string()));
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<()> {
        self.check(channel)?;
        trace!(channel, "unsubscribe");
        lock(&self.subscribed).remove(channel);
        lock(&self.calls).push(RelayCall::Unsubscribe(channel.to_string()));
        Ok(())
    }

    async fn publish(&self, text: &str, channel: &str) -> Result<()> {
        self.check(channel)?;
        trace!(channel, text, "publish");
        lock(&self.calls).push(RelayCall::Publish { channel: channel.to_string(), text: text.to_string() });
        Ok(())
    }
}

/// Tracked-race store kept in a map.
#[derive(Debug, Default)]
pub struct MemoryRaceStore {
    races: Mutex<HashMap<String, bool>>,
    finish_marks: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryRaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail as if the backing store were down.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RaceError::store(operation, "store marked as failing"))
        } else {
            Ok(())
        }
    }

    /// Number of `mark_finished(_, true)` calls.
    pub fn finish_mark_count(&self) -> usize {
        self.finish_marks.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RaceStore for MemoryRaceStore {
    async fn mark_tracked(&self, race_id: &str) -> Result<()> {
        self.check("mark_tracked")?;
        lock(&self.races).insert(race_id.to_string(), false);
        Ok(())
    }

    async fn mark_finished(&self, race_id: &str, finished: bool) -> Result<()> {
        self.check("mark_finished")?;
        if finished {
            self.finish_marks.fetch_add(1, Ordering::SeqCst);
        }
        lock(&self.races).insert(race_id.to_string(), finished);
        Ok(())
    }

    async fn is_tracked(&self, race_id: &str) -> Result<bool> {
        self.check("is_tracked")?;
        Ok(lock(&self.races).contains_key(race_id))
    }

    async fn is_finished(&self, race_id: &str) -> Result<bool> {
        self.check("is_finished")?;
        Ok(lock(&self.races).get(race_id).copied().unwrap_or(false))
    }

    async fn remove(&self, race_id: &str) -> Result<()> {
        self.check("remove")?;
        lock(&self.races).remove(race_id);
        Ok(())
    }

    async fn remove_unfinished(&self) -> Result<usize> {
        self.check("remove_unfinished")?;
        let mut races = lock(&self.races);
        let before = races.len();
        races.retain(|_, finished| *finished);
        Ok(before - races.len())
    }
}

/// Blacklist of lowercased chat handles.
#[derive(Debug, Default)]
pub struct MemoryBlacklist {
    handles: Mutex<HashSet<String>>,
}

impl MemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handles<'a>(handles: impl IntoIterator<Item = &'a str>) -> Self {
        let blacklist = Self::new();
        lock(&blacklist.handles).extend(handles.into_iter().map(str::to_lowercase));
        blacklist
    }
}

#[async_trait::async_trait]
impl Blacklist for MemoryBlacklist {
    async fn is_blacklisted(&self, handle: &str) -> bool {
        lock(&self.handles).contains(&handle.to_lowercase())
    }

    async fn add(&self, handle: &str) -> Result<()> {
        lock(&self.handles).insert(handle.to_lowercase());
        Ok(())
    }

    async fn remove(&self, handle: &str) -> Result<()> {
        lock(&self.handles).remove(&handle.to_lowercase());
        Ok(())
    }
}

/// Result destination that keeps posts and edits.
#[derive(Debug, Default)]
pub struct MemoryResults {
    live: Mutex<Vec<String>>,
    records: Mutex<Vec<(MessageHandle, String)>>,
    edits: Mutex<Vec<(MessageHandle, String)>>,
    next_id: AtomicU64,
    fail_posts: AtomicBool,
}

impl MemoryResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_posts(&self) -> Vec<String> {
        lock(&self.live).clone()
    }

    pub fn records(&self) -> Vec<(MessageHandle, String)> {
        lock(&self.records).clone()
    }

    pub fn edits(&self) -> Vec<(MessageHandle, String)> {
        lock(&self.edits).clone()
    }

    /// Live posts plus record posts.
    pub fn post_count(&self) -> usize {
        lock(&self.live).len() + lock(&self.records).len()
    }

    /// Reject new live and record posts. Edits are unaffected.
    pub fn set_fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    fn check_post(&self, target: &str) -> Result<()> {
        if self.fail_posts.load(Ordering::SeqCst) {
            Err(RaceError::delivery(target, "result posts marked as failing"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ResultPublisher for MemoryResults {
    async fn post_live(&self, text: &str) -> Result<()> {
        self.check_post("live")?;
        lock(&self.live).push(text.to_string());
        Ok(())
    }

    async fn post_record(&self, text: &str) -> Result<MessageHandle> {
        self.check_post("record")?;
        let handle = MessageHandle { channel: "record".to_string(), id: self.next_id.fetch_add(1, Ordering::SeqCst) };
        lock(&self.records).push((handle.clone(), text.to_string()));
        Ok(handle)
    }

    async fn edit_record(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        let mut records = lock(&self.records);
        let Some(record) = records.iter_mut().find(|(posted, _)| posted == handle) else {
            return Err(RaceError::delivery(handle.to_string(), "unknown record message"));
        };
        record.1 = text.to_string();
        lock(&self.edits).push((handle.clone(), text.to_string()));
        Ok(())
    }
}

/// The full in-memory collaborator set, with typed access for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryServices {
    pub discovery: Arc<StaticDiscovery>,
    pub chat: Arc<MemoryChatRelay>,
    pub split_feed: Arc<MemoryChatRelay>,
    pub store: Arc<MemoryRaceStore>,
    pub blacklist: Arc<MemoryBlacklist>,
    pub results: Arc<MemoryResults>,
    pub leases: ChannelLeases,
}

impl MemoryServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type-erased view handed to races and the tracker.
    pub fn services(&self) -> Services {
        Services {
            discovery: self.discovery.clone(),
            chat: self.chat.clone(),
            split_feed: self.split_feed.clone(),
            store: self.store.clone(),
            blacklist: self.blacklist.clone(),
            results: self.results.clone(),
            leases: self.leases.clone(),
        }
    }
}
