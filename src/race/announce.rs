//! Announcements, the finish sequence and deferred comment refreshes.

use tracing::{debug, info, warn};

use super::Race;
use crate::driver::RaceEvent;
use crate::registry::SubsetWatch;
use crate::runner::Runner;
use crate::types::Checkpoint;

/// Who an announcement is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    /// Every runner's standings, sent to every chat watcher.
    Everyone,
    /// A runner's watched subset, sent to that runner's channel only.
    Subset(SubsetWatch),
}

impl Race {
    /// Publish split standings for `checkpoint`.
    ///
    /// Global announcements happen at most once per checkpoint. Subset
    /// announcements are deduplicated per runner by the registry instead.
    pub async fn announce(&mut self, checkpoint: &Checkpoint, audience: Audience) {
        let (text, channels) = match &audience {
            Audience::Everyone => {
                if self.announced.contains(checkpoint) {
                    debug!(race_id = %self.id, checkpoint = checkpoint.name(), "split already announced");
                    return;
                }
                let everyone: Vec<&Runner> = self.runners.iter().collect();
                let text = self.runners.split_standings(checkpoint, &everyone);
                (text, self.chat_watchers.iter().cloned().collect::<Vec<_>>())
            }
            Audience::Subset(watch) => {
                let subset = self.runners.resolve(watch.watched.iter().map(String::as_str));
                let text = self.runners.split_standings(checkpoint, &subset);
                (text, vec![watch.handle.clone()])
            }
        };

        for channel in channels.iter().filter(|channel| !channel.is_empty()) {
            if self.silenced {
                debug!(race_id = %self.id, channel = %channel, text = %text, "race silenced, skipping announcement");
            } else if self.services.blacklist.is_blacklisted(channel).await {
                debug!(race_id = %self.id, channel = %channel, text = %text, "channel blacklisted, skipping announcement");
            } else {
                info!(race_id = %self.id, checkpoint = checkpoint.name(), channel = %channel, "announcing split");
                if let Err(e) = self.services.chat.publish(&text, channel).await {
                    warn!(race_id = %self.id, channel = %channel, error = %e, "failed to deliver announcement");
                }
            }
        }

        if matches!(audience, Audience::Everyone) {
            self.announced.push(checkpoint.clone());
        }
    }

    pub(super) async fn announce_subsets(&mut self, checkpoint: &Checkpoint) {
        for watch in self.runners.subset_announce_candidates(checkpoint) {
            self.announce(checkpoint, Audience::Subset(watch)).await;
        }
    }

    /// Announce `checkpoint` globally if everyone is done with it, finishing
    /// the race when it was the last one.
    pub(super) async fn check_global(&mut self, checkpoint: &Checkpoint) {
        match self.runners.global_announce_eligible(checkpoint) {
            (_, true) => self.finish_race().await,
            (true, false) => self.announce(checkpoint, Audience::Everyone).await,
            (false, false) => {}
        }
    }

    /// Check every real checkpoint not yet announced.
    pub async fn sweep_announcements(&mut self) {
        let pending: Vec<Checkpoint> =
            self.catalog.reportable().filter(|checkpoint| !self.announced.contains(checkpoint)).cloned().collect();
        for checkpoint in pending {
            if self.finished {
                break;
            }
            self.check_global(&checkpoint).await;
        }
    }

    /// Close out the race: final announcement, channel cleanup, results.
    ///
    /// Runs once; later calls return immediately.
    pub async fn finish_race(&mut self) {
        if self.finished {
            return;
        }

        let terminal = self.catalog.terminal().clone();
        self.announce(&terminal, Audience::Everyone).await;
        self.finished = true;
        info!(race_id = %self.id, "race finished");

        self.disconnect().await;
        if let Err(e) = self.services.store.mark_finished(&self.id, true).await {
            warn!(race_id = %self.id, error = %e, "failed to mark race finished");
        }

        let results = self.results();
        if let Err(e) = self.services.results.post_live(&results).await {
            warn!(race_id = %self.id, error = %e, "failed to post live results");
        }
        match self.services.results.post_record(&results).await {
            Ok(handle) => self.record_message = Some(handle),
            Err(e) => warn!(race_id = %self.id, error = %e, "failed to post record results"),
        }

        self.schedule_comment_refresh();
    }

    /// Refresh the roster and fold runner comments into the record message.
    pub async fn refresh_comments(&mut self) {
        self.update_race().await;
        let Some(handle) = self.record_message.clone() else {
            debug!(race_id = %self.id, "no record message to update");
            return;
        };
        if let Err(e) = self.services.results.edit_record(&handle, &self.results()).await {
            warn!(race_id = %self.id, message = %handle, error = %e, "failed to update record message");
        }
    }

    /// Queue the configured number of comment refreshes into the race's own
    /// mailbox.
    fn schedule_comment_refresh(&self) {
        let Some(mailbox) = self.mailbox.clone() else {
            debug!(race_id = %self.id, "race has no mailbox, skipping comment refresh");
            return;
        };
        let cancel = self.cancel.clone();
        let race_id = self.id.clone();
        let delay = self.settings.comment_refresh_delay;
        let count = self.settings.comment_refresh_count;

        tokio::spawn(async move {
            for round in 1..=count {
                info!(race_id = %race_id, round, delay_secs = delay.as_secs(), "waiting before updating comments");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(race_id = %race_id, "race stopped, dropping comment refresh");
                        return;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                let Some(sender) = mailbox.upgrade() else {
                    debug!(race_id = %race_id, "race is gone, dropping comment refresh");
                    return;
                };
                if sender.send(RaceEvent::RefreshComments).await.is_err() {
                    debug!(race_id = %race_id, "race mailbox closed, dropping comment refresh");
                    return;
                }
            }
        });
    }
}
