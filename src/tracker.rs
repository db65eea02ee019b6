//! The set of tracked races and the operations a command layer calls.
//!
//! Each race runs in its own task (see [`RaceDriver`]). The tracker keeps a
//! handle per race: the event sender, the race's summary receiver and its
//! cancellation token. Queries that span races read the summaries and never
//! wait on a busy race; operations on one race are queued into its mailbox
//! as [`RaceEvent::Run`] jobs and answered over a oneshot channel.
//!
//! ```rust,no_run
//! use splitwatch::providers::MemoryServices;
//! use splitwatch::{Tracker, TrackerConfig, WatchFlags};
//!
//! # async fn demo() -> splitwatch::Result<()> {
//! let memory = MemoryServices::new();
//! let tracker = Tracker::new(memory.services(), TrackerConfig::default())?;
//! let watched = tracker.watch("sidosh", WatchFlags::default()).await?;
//! println!("{watched}");
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::discovery::find_race_with_user;
use crate::driver::{RaceDriver, RaceEvent, job};
use crate::provider::Services;
use crate::race::{Race, RaceSettings, RaceSummary};
use crate::relay::{RelayCommand, race_id_from_channel, split_feed_channel};
use crate::types::SplitCatalog;
use crate::{RaceError, Result};

/// Options given when starting to watch a race.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchFlags {
    /// Track standings without posting to chat.
    pub silent: bool,
    /// Wrap posted results in spoiler markers.
    pub spoiler: bool,
}

impl WatchFlags {
    /// Parse command words such as `silent` and `spoiler`.
    pub fn from_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Self {
        let mut flags = Self::default();
        for arg in args {
            match arg.to_ascii_lowercase().as_str() {
                "silent" | "silence" => flags.silent = true,
                "spoiler" => flags.spoiler = true,
                _ => {}
            }
        }
        flags
    }
}

/// A race that just started being tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watched {
    pub race_id: String,
    /// One-line race description from the discovery source.
    pub summary: String,
    pub flags: WatchFlags,
}

impl fmt::Display for Watched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Found a race! ID: {}\n{}\nThis race will now be tracked", self.race_id, self.summary)?;
        if self.flags.silent {
            f.write_str(" silently")?;
        }
        if self.flags.spoiler {
            f.write_str(" and marked as a spoiler")?;
        }
        Ok(())
    }
}

#[derive(Clone)]
struct RaceHandle {
    events: mpsc::Sender<RaceEvent>,
    summary: watch::Receiver<RaceSummary>,
    cancel: CancellationToken,
}

/// Every race currently tracked, keyed by race id.
pub struct Tracker {
    services: Services,
    catalog: Arc<SplitCatalog>,
    settings: RaceSettings,
    game_id: u32,
    mailbox_capacity: usize,
    races: RwLock<BTreeMap<String, RaceHandle>>,
}

impl Tracker {
    pub fn new(services: Services, config: TrackerConfig) -> Result<Self> {
        Ok(Self {
            catalog: Arc::new(config.catalog()?),
            settings: config.race_settings(),
            game_id: config.game_id,
            mailbox_capacity: config.mailbox_capacity,
            services,
            races: RwLock::new(BTreeMap::new()),
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, RaceHandle>> {
        self.races.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, RaceHandle>> {
        self.races.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self, race_id: &str) -> Result<RaceHandle> {
        self.read().get(race_id).cloned().ok_or_else(|| RaceError::race_not_found(race_id))
    }

    /// Start tracking the newest open race `user` has entered.
    pub async fn watch(&self, user: &str, flags: WatchFlags) -> Result<Watched> {
        let races = self.services.discovery.list_races().await?;
        let listing = find_race_with_user(&races, user, Some(self.game_id))
            .ok_or_else(|| RaceError::NoRaceForUser { user: user.to_string() })?;
        let race_id = listing.id.clone();
        let summary = listing.summary();

        if self.services.store.is_tracked(&race_id).await? {
            return Err(RaceError::AlreadyTracked { race_id, summary });
        }

        info!(race_id = %race_id, user, "watching race");
        self.services.split_feed.subscribe(&split_feed_channel(&race_id)).await?;
        self.services.store.mark_tracked(&race_id).await?;

        let race = Race::new(race_id.clone(), Arc::clone(&self.catalog), self.services.clone(), self.settings.clone());
        let channels = RaceDriver::spawn(race, self.mailbox_capacity);
        let handle = RaceHandle { events: channels.events, summary: channels.summary, cancel: channels.cancel };
        let previous = self.write().insert(race_id.clone(), handle);
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        self.with_race(&race_id, move |race| {
            async move {
                race.update_race().await;
                race.set_silenced(flags.silent);
                race.set_spoiler(flags.spoiler);
            }
            .boxed()
        })
        .await?;

        Ok(Watched { race_id, summary, flags })
    }

    /// Stop tracking a race the store knows about.
    pub async fn unwatch(&self, race_id: &str) -> Result<()> {
        if !self.services.store.is_tracked(race_id).await? {
            return Err(RaceError::NotTracked { race_id: race_id.to_string() });
        }
        self.services.store.remove(race_id).await?;

        let removed = self.write().remove(race_id);
        let Some(handle) = removed else {
            return Err(RaceError::race_not_found(race_id));
        };
        info!(race_id, "unwatching race");
        if Self::run(&handle, race_id, |race| race.stop().boxed()).await.is_err() {
            handle.cancel.cancel();
        }
        Ok(())
    }

    /// Queue `f` on the race and wait for its answer.
    pub async fn with_race<T, F>(&self, race_id: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Race) -> BoxFuture<'a, T> + Send + 'static,
    {
        let handle = self.handle(race_id)?;
        Self::run(&handle, race_id, f).await
    }

    async fn run<T, F>(handle: &RaceHandle, race_id: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Race) -> BoxFuture<'a, T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let queued = job(move |race| {
            async move {
                let _ = reply_tx.send(f(race).await);
            }
            .boxed()
        });

        let closed = || RaceError::RaceClosed { race_id: race_id.to_string() };
        handle.events.send(RaceEvent::Run(queued)).await.map_err(|_| closed())?;
        reply_rx.await.map_err(|_| closed())
    }

    /// Synchronous variant of [`with_race`](Self::with_race).
    async fn inspect<T, F>(&self, race_id: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Race) -> T + Send + 'static,
    {
        self.with_race(race_id, move |race| {
            let out = f(race);
            async move { out }.boxed()
        })
        .await
    }

    /// Push an event into a race's mailbox without waiting for it.
    pub async fn dispatch(&self, race_id: &str, event: RaceEvent) -> Result<()> {
        let handle = self.handle(race_id)?;
        handle.events.send(event).await.map_err(|_| RaceError::RaceClosed { race_id: race_id.to_string() })
    }

    /// Route a livesplit relay message to its race.
    ///
    /// Returns false when the channel belongs to no tracked race or the
    /// message is not a relay command.
    pub async fn handle_relay(&self, channel: &str, username: &str, command: &str, body: &str) -> Result<bool> {
        let Some(race_id) = race_id_from_channel(channel) else {
            return Ok(false);
        };
        if !self.read().contains_key(race_id) {
            debug!(race_id, "relay message for untracked race");
            return Ok(false);
        }
        let Some(command) = RelayCommand::decode(command, body) else {
            return Ok(false);
        };
        self.dispatch(race_id, command.into_event(username)).await?;
        Ok(true)
    }

    /// Ids of every race the tracker holds, finished or not.
    pub fn race_ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn summary(&self, race_id: &str) -> Option<RaceSummary> {
        self.read().get(race_id).map(|handle| handle.summary.borrow().clone())
    }

    /// Stream of a race's summary, starting with the current one.
    pub fn summary_updates(&self, race_id: &str) -> Option<WatchStream<RaceSummary>> {
        self.read().get(race_id).map(|handle| WatchStream::new(handle.summary.clone()))
    }

    /// Unfinished race a chat channel belongs to, as runner or watcher.
    pub fn race_for_channel(&self, channel: &str) -> Option<String> {
        self.read()
            .iter()
            .find(|(_, handle)| handle.summary.borrow().involves(channel))
            .map(|(race_id, _)| race_id.clone())
    }

    /// Live standings for the race `channel` follows, if it is subscribed.
    pub async fn standings_for_channel(&self, channel: &str) -> Result<Option<String>> {
        let Some(race_id) = self.race_for_channel(channel) else {
            return Ok(None);
        };
        if !self.services.leases.is_leased(&channel.to_lowercase()) {
            return Ok(None);
        }
        self.inspect(&race_id, |race| race.live_standings()).await.map(Some)
    }

    pub async fn info_for_channel(&self, channel: &str) -> Result<Option<String>> {
        match self.race_for_channel(channel) {
            Some(race_id) => self.inspect(&race_id, |race| race.user_info()).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn multitwitch_for_channel(&self, channel: &str) -> Result<Option<String>> {
        match self.race_for_channel(channel) {
            Some(race_id) => self.inspect(&race_id, |race| race.multitwitch_link()).await.map(Some),
            None => Ok(None),
        }
    }

    /// Race for a runner speaking in their own channel.
    fn owner_race(&self, channel: &str, speaker: &str) -> Option<String> {
        if !channel.eq_ignore_ascii_case(speaker) {
            return None;
        }
        self.race_for_channel(channel)
    }

    /// Set the speaker's watch list from a comma separated list of runners.
    pub async fn set_watchlist(&self, channel: &str, speaker: &str, aliases: &str) -> Result<Option<BTreeSet<String>>> {
        let Some(race_id) = self.owner_race(channel, speaker) else {
            return Ok(None);
        };
        let (speaker, aliases) = (speaker.to_string(), aliases.to_string());
        self.inspect(&race_id, move |race| race.runners_mut().set_watchlist(&speaker, &aliases)).await
    }

    /// Returns whether the watch list was reset.
    pub async fn reset_watchlist(&self, channel: &str, speaker: &str) -> Result<bool> {
        let Some(race_id) = self.owner_race(channel, speaker) else {
            return Ok(false);
        };
        let speaker = speaker.to_string();
        self.inspect(&race_id, move |race| race.runners_mut().reset_watchlist(&speaker)).await
    }

    pub async fn watchlist(&self, channel: &str, speaker: &str) -> Result<Option<BTreeSet<String>>> {
        let Some(race_id) = self.owner_race(channel, speaker) else {
            return Ok(None);
        };
        let speaker = speaker.to_string();
        self.inspect(&race_id, move |race| race.runners().watchlist(&speaker).cloned()).await
    }

    /// Returns whether the channel was added.
    pub async fn add_watcher(&self, race_id: &str, channel: &str) -> Result<bool> {
        let channel = channel.to_string();
        self.with_race(race_id, move |race| async move { race.add_external_watcher(&channel).await }.boxed()).await
    }

    /// Pull the race's roster now.
    pub async fn refresh(&self, race_id: &str) -> Result<()> {
        self.with_race(race_id, |race| race.update_race().boxed()).await
    }

    /// Refresh the posted results of a finished race.
    pub async fn update_comments(&self, race_id: &str) -> Result<()> {
        let id = race_id.to_string();
        self.with_race(race_id, move |race| {
            async move {
                if !race.is_finished() {
                    return Err(RaceError::RaceNotFinished { race_id: id });
                }
                race.refresh_comments().await;
                Ok(())
            }
            .boxed()
        })
        .await?
    }

    pub async fn set_spoiler(&self, race_id: &str, spoiler: bool) -> Result<()> {
        self.inspect(race_id, move |race| race.set_spoiler(spoiler)).await
    }

    pub async fn set_silenced(&self, race_id: &str, silenced: bool) -> Result<()> {
        self.inspect(race_id, move |race| race.set_silenced(silenced)).await
    }

    pub async fn set_ignored(&self, race_id: &str, runner: &str, ignored: bool) -> Result<()> {
        let runner = runner.to_string();
        self.inspect(race_id, move |race| race.set_ignored(&runner, ignored)).await?
    }

    /// Finish a runner by hand with `forfeit` or a finish time.
    pub async fn force_finish(&self, race_id: &str, runner: &str, time: &str) -> Result<()> {
        let (runner, time) = (runner.to_string(), time.to_string());
        self.with_race(race_id, move |race| async move { race.force_finish(&runner, &time).await }.boxed())
            .await?
    }

    /// Refresh the roster and return the results text.
    pub async fn post_results(&self, race_id: &str) -> Result<String> {
        self.with_race(race_id, |race| {
            async move {
                race.update_race().await;
                race.results()
            }
            .boxed()
        })
        .await
    }

    /// Drop every unfinished race and stop all race tasks.
    ///
    /// Returns how many races were still running.
    pub async fn shutdown(&self) -> Result<usize> {
        let races: Vec<(String, RaceHandle)> = std::mem::take(&mut *self.write()).into_iter().collect();
        for (race_id, handle) in races {
            if !handle.summary.borrow().finished {
                info!(race_id = %race_id, "dropping unfinished race");
            }
            if handle.cancel.is_cancelled() {
                continue;
            }
            handle.cancel.cancel();
            debug!(race_id = %race_id, "race task cancelled");
        }

        let count = self.services.store.remove_unfinished().await?;
        if count > 0 {
            warn!(count, "shutting down with unfinished races");
        }
        Ok(count)
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("game_id", &self.game_id)
            .field("races", &self.race_ids())
            .finish_non_exhaustive()
    }
}
