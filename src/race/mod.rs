//! One tracked race and its lifecycle.
//!
//! A [`Race`] owns its [`RunnerRegistry`] and reconciles three kinds of
//! input against it: roster refreshes from the discovery source, split and
//! finish events from the livesplit relay, and commands queued by the
//! tracker. Every mutation happens inside the race's driver task (see
//! [`crate::driver`]), so nothing here needs locking.
//!
//! Announcement and finish handling live in [`announce`].

mod announce;

pub use announce::Audience;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::{Entrant, EntrantStatus};
use crate::driver::RaceEvent;
use crate::provider::{MessageHandle, Services};
use crate::registry::RunnerRegistry;
use crate::relay::split_feed_channel;
use crate::runner::Runner;
use crate::types::{Checkpoint, SplitCatalog, Timestamp};
use crate::{RaceError, Result};

/// Per-race timing knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceSettings {
    /// Wait before each deferred comment refresh after the finish.
    pub comment_refresh_delay: Duration,
    /// Number of deferred comment refreshes.
    pub comment_refresh_count: u32,
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self { comment_refresh_delay: Duration::from_secs(60), comment_refresh_count: 2 }
    }
}

/// Lookup keys of one runner, as published in a [`RaceSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerAlias {
    pub name: String,
    pub handle: String,
}

/// Snapshot of a race used for cross-race queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceSummary {
    pub race_id: String,
    pub finished: bool,
    pub runners: Vec<RunnerAlias>,
    pub chat_watchers: BTreeSet<String>,
}

impl RaceSummary {
    /// Whether `channel` belongs to this race while it is still running.
    pub fn involves(&self, channel: &str) -> bool {
        if self.finished {
            return false;
        }
        let channel = channel.to_lowercase();
        self.chat_watchers.contains(&channel)
            || self.runners.iter().any(|runner| {
                runner.name.to_lowercase() == channel || (!runner.handle.is_empty() && runner.handle == channel)
            })
    }
}

/// A tracked live race.
pub struct Race {
    id: String,
    catalog: Arc<SplitCatalog>,
    runners: RunnerRegistry,
    announced: Vec<Checkpoint>,
    finished: bool,
    silenced: bool,
    spoiler: bool,
    chat_watchers: BTreeSet<String>,
    record_message: Option<MessageHandle>,
    services: Services,
    settings: RaceSettings,
    mailbox: Option<mpsc::WeakSender<RaceEvent>>,
    cancel: CancellationToken,
}

impl Race {
    pub fn new(id: impl Into<String>, catalog: Arc<SplitCatalog>, services: Services, settings: RaceSettings) -> Self {
        Self {
            id: id.into(),
            catalog,
            runners: RunnerRegistry::new(),
            announced: Vec::new(),
            finished: false,
            silenced: false,
            spoiler: false,
            chat_watchers: BTreeSet::new(),
            record_message: None,
            services,
            settings,
            mailbox: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Livesplit relay channel carrying this race's split events.
    pub fn split_feed_channel(&self) -> String {
        split_feed_channel(&self.id)
    }

    pub fn catalog(&self) -> &SplitCatalog {
        &self.catalog
    }

    pub fn runners(&self) -> &RunnerRegistry {
        &self.runners
    }

    pub fn runners_mut(&mut self) -> &mut RunnerRegistry {
        &mut self.runners
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_silenced(&self) -> bool {
        self.silenced
    }

    pub fn set_silenced(&mut self, silenced: bool) {
        info!(race_id = %self.id, silenced, "race silence changed");
        self.silenced = silenced;
    }

    pub fn is_spoiler(&self) -> bool {
        self.spoiler
    }

    pub fn set_spoiler(&mut self, spoiler: bool) {
        info!(race_id = %self.id, spoiler, "race spoiler changed");
        self.spoiler = spoiler;
    }

    /// Chat channels currently relaying this race.
    pub fn chat_watchers(&self) -> &BTreeSet<String> {
        &self.chat_watchers
    }

    /// Checkpoints already announced to every watcher, in announcement order.
    pub fn announced(&self) -> &[Checkpoint] {
        &self.announced
    }

    pub fn record_message(&self) -> Option<&MessageHandle> {
        self.record_message.as_ref()
    }

    /// Weak handle to the race's own event queue, used by deferred work.
    pub fn set_mailbox(&mut self, mailbox: mpsc::WeakSender<RaceEvent>) {
        self.mailbox = Some(mailbox);
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn summary(&self) -> RaceSummary {
        RaceSummary {
            race_id: self.id.clone(),
            finished: self.finished,
            runners: self
                .runners
                .iter()
                .map(|runner| RunnerAlias { name: runner.name().to_string(), handle: runner.handle().to_string() })
                .collect(),
            chat_watchers: self.chat_watchers.clone(),
        }
    }

    /// Ignored runners no longer hold back announcements.
    pub fn set_ignored(&mut self, alias: &str, ignored: bool) -> Result<()> {
        if self.runners.set_ignored(alias, ignored) {
            info!(race_id = %self.id, runner = alias, ignored, "runner ignore changed");
            Ok(())
        } else {
            Err(RaceError::runner_not_found(alias, &self.id))
        }
    }

    /// Reconcile the registry with the current roster.
    ///
    /// Returns true when any runner switched to forfeited during the call.
    pub async fn refresh_roster(&mut self, entrants: &BTreeMap<String, Entrant>) -> bool {
        let dropped = self.runners.drain_where(|runner| {
            !runner.has_any_split() && !entrants.iter().any(|(key, entrant)| entrant_is(runner, key, entrant))
        });
        for runner in dropped {
            info!(race_id = %self.id, runner = runner.name(), "removing runner that left before splitting");
            if self.chat_watchers.remove(runner.handle()) {
                self.release_channel(runner.handle()).await;
            }
        }

        let mut newly_forfeited = false;
        for (key, entrant) in entrants {
            let alias = [key.as_str(), entrant.display_name.as_str(), entrant.chat_handle.as_str()]
                .into_iter()
                .find(|alias| !alias.is_empty() && self.runners.get(alias).is_some());
            let alias = match alias {
                Some(alias) => alias,
                None => {
                    info!(race_id = %self.id, runner = %entrant.display_name, "adding entrant");
                    self.runners.insert(Runner::from_entrant(entrant));
                    entrant.display_name.as_str()
                }
            };
            let Some(runner) = self.runners.get_mut(alias) else {
                continue;
            };

            let was_forfeited = runner.is_forfeited();
            runner.update_status(&entrant.status);
            runner.set_message(entrant.message.clone());
            if !was_forfeited && runner.is_forfeited() {
                newly_forfeited = true;
            }

            let handle = runner.handle().to_string();
            if !handle.is_empty() && !self.finished {
                self.reconcile_subscription(&handle, &entrant.status).await;
            }
        }

        newly_forfeited
    }

    async fn reconcile_subscription(&mut self, handle: &str, status: &EntrantStatus) {
        let blacklisted = self.services.blacklist.is_blacklisted(handle).await;
        if blacklisted || status.is_forfeit() {
            if self.chat_watchers.remove(handle) {
                info!(race_id = %self.id, channel = handle, blacklisted, "removing chat watcher");
                self.release_channel(handle).await;
            }
        } else if !self.chat_watchers.contains(handle) {
            self.subscribe_channel(handle).await;
        }
    }

    async fn subscribe_channel(&mut self, channel: &str) -> bool {
        match self.services.chat.subscribe(channel).await {
            Ok(()) => {
                info!(race_id = %self.id, channel, "adding chat watcher");
                self.services.leases.acquire(channel, &self.id);
                self.chat_watchers.insert(channel.to_string());
                true
            }
            Err(e) => {
                warn!(race_id = %self.id, channel, error = %e, "failed to subscribe chat channel");
                false
            }
        }
    }

    /// Drop this race's lease on `channel`, unsubscribing if it was the last.
    async fn release_channel(&self, channel: &str) {
        if !self.services.leases.release(channel, &self.id) {
            debug!(race_id = %self.id, channel, "channel still used by another race");
            return;
        }
        if let Err(e) = self.services.chat.unsubscribe(channel).await {
            warn!(race_id = %self.id, channel, error = %e, "failed to unsubscribe chat channel");
        }
    }

    /// Release every chat channel and the split feed.
    async fn disconnect(&mut self) {
        for channel in std::mem::take(&mut self.chat_watchers) {
            self.release_channel(&channel).await;
        }
        let feed = self.split_feed_channel();
        info!(race_id = %self.id, channel = %feed, "leaving split feed");
        if let Err(e) = self.services.split_feed.unsubscribe(&feed).await {
            warn!(race_id = %self.id, channel = %feed, error = %e, "failed to leave split feed");
        }
    }

    /// Pull the roster from the discovery source and apply it.
    ///
    /// A new forfeit can complete checkpoints for everyone else, so it
    /// triggers an announcement sweep.
    pub async fn update_race(&mut self) {
        match self.services.discovery.fetch_race(&self.id).await {
            Ok(Some(listing)) => {
                debug!(race_id = %self.id, entrants = listing.entrants.len(), "updating race");
                let forfeited = self.refresh_roster(&listing.entrants).await;
                if forfeited && !self.finished {
                    info!(race_id = %self.id, "runner forfeited, checking pending announcements");
                    self.sweep_announcements().await;
                }
            }
            Ok(None) => warn!(race_id = %self.id, "race missing from discovery source"),
            Err(e) => warn!(race_id = %self.id, error = %e, "unable to update race"),
        }
    }

    /// Handle a split event from the relay.
    pub async fn ingest_split(&mut self, alias: &str, timestamp: Timestamp) {
        let Some(checkpoint) = timestamp.checkpoint_name().and_then(|name| self.catalog.get(name)).cloned() else {
            info!(race_id = %self.id, runner = alias, split = %timestamp, "could not process split");
            return;
        };

        self.update_race().await;
        self.runners.apply_split_event(alias, &checkpoint, timestamp);
        self.announce_subsets(&checkpoint).await;
        self.check_global(&checkpoint).await;
    }

    /// Handle a finish event from the relay.
    pub async fn ingest_finish(&mut self, alias: &str, timestamp: Timestamp) {
        let terminal = self.catalog.terminal().clone();
        self.runners.apply_finish_event(alias, &terminal, timestamp);
        self.announce_subsets(&terminal).await;

        if self.runners.is_finished() {
            self.finish_race().await;
        }
    }

    /// Subscribe a channel that follows the race without running in it.
    ///
    /// Returns whether the channel was added.
    pub async fn add_external_watcher(&mut self, channel: &str) -> bool {
        let channel = channel.to_lowercase();
        if self.chat_watchers.contains(&channel) || self.services.blacklist.is_blacklisted(&channel).await {
            return false;
        }
        self.subscribe_channel(&channel).await
    }

    /// Finish a runner by hand: `forfeit`, or a finish time such as
    /// `1:52:51.24`.
    pub async fn force_finish(&mut self, alias: &str, time: &str) -> Result<()> {
        let Some(runner) = self.runners.get_mut(alias) else {
            return Err(RaceError::runner_not_found(alias, &self.id));
        };

        if time.eq_ignore_ascii_case("forfeit") {
            info!(race_id = %self.id, runner = runner.name(), "forfeiting runner by hand");
            runner.update_status(&EntrantStatus::Forfeit);
            self.sweep_announcements().await;
            return Ok(());
        }

        let name = runner.name().to_string();
        let timestamp = Timestamp::parse(&format!("RealTime {time}"))
            .filter(Timestamp::is_concrete)
            .ok_or_else(|| RaceError::parse("finish time", format!("Invalid timestamp format: {time}")))?;
        info!(race_id = %self.id, runner = %name, time, "finishing runner by hand");
        self.ingest_finish(&name, timestamp).await;
        Ok(())
    }

    /// Stop tracking: release every channel and cancel deferred work.
    pub async fn stop(&mut self) {
        info!(race_id = %self.id, "stopping race");
        if !self.finished {
            self.disconnect().await;
            self.finished = true;
        }
        self.cancel.cancel();
    }

    /// Live standings on one line.
    pub fn live_standings(&self) -> String {
        self.runners.overall_standings(false, false).join(" ")
    }

    /// Multitwitch link of every runner still racing, ordered by name.
    pub fn multitwitch_link(&self) -> String {
        let mut link = String::from("https://multitwitch.tv/");
        for runner in self.sorted_by_name() {
            if !runner.handle().is_empty() && !runner.is_forfeited() {
                link.push_str(runner.handle());
                link.push('/');
            }
        }
        link
    }

    /// Channel link of every runner, ordered by name.
    pub fn user_info(&self) -> String {
        let mut info = String::from("Runner info | ");
        for runner in self.sorted_by_name() {
            info.push_str(&format!("{} - twitch.tv/{} | ", runner.name(), runner.handle()));
        }
        info
    }

    /// Final results text. Spoiler races wrap the standings in `||`.
    pub fn results(&self) -> String {
        format!("Race {} results:\n\n{}", self.id, self.runners.standings(self.spoiler))
    }

    fn sorted_by_name(&self) -> Vec<&Runner> {
        let mut runners: Vec<&Runner> = self.runners.iter().collect();
        runners.sort_by_cached_key(|runner| runner.name().to_lowercase());
        runners
    }
}

impl std::fmt::Debug for Race {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Race")
            .field("id", &self.id)
            .field("runners", &self.runners.len())
            .field("finished", &self.finished)
            .field("silenced", &self.silenced)
            .field("spoiler", &self.spoiler)
            .field("chat_watchers", &self.chat_watchers)
            .finish_non_exhaustive()
    }
}

fn entrant_is(runner: &Runner, key: &str, entrant: &Entrant) -> bool {
    runner.matches(key)
        || runner.matches(&entrant.display_name)
        || (!entrant.chat_handle.is_empty() && runner.matches(&entrant.chat_handle))
}
