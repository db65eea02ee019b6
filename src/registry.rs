//! The runners of one race: lookup, completion and ranking.
//!
//! Announcement decisions live here as pure predicates so the race
//! orchestrator only has to act on their answers:
//!
//! - [`RunnerRegistry::global_announce_eligible`] says whether every runner is
//!   done with a checkpoint, and whether that also ends the race
//! - [`RunnerRegistry::subset_announce_candidates`] returns the runners whose
//!   personal watch list just completed a checkpoint, marking each so it fires
//!   only once

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::runner::Runner;
use crate::types::{Checkpoint, Timestamp};

/// A runner whose watch list has completed a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetWatch {
    /// Chat handle of the watching runner; announcements go to this channel.
    pub handle: String,
    /// Handles of the watched runners that resolved to registry entries.
    pub watched: Vec<String>,
}

/// All runners of a race, in roster order.
#[derive(Debug, Clone, Default)]
pub struct RunnerRegistry {
    runners: Vec<Runner>,
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Runner> {
        self.runners.iter()
    }

    /// First runner matching `alias` by display name or chat handle.
    pub fn get(&self, alias: &str) -> Option<&Runner> {
        self.runners.iter().find(|runner| runner.matches(alias))
    }

    pub fn get_mut(&mut self, alias: &str) -> Option<&mut Runner> {
        self.runners.iter_mut().find(|runner| runner.matches(alias))
    }

    pub fn insert(&mut self, runner: Runner) {
        self.runners.push(runner);
    }

    pub fn remove(&mut self, alias: &str) -> Option<Runner> {
        let index = self.runners.iter().position(|runner| runner.matches(alias))?;
        Some(self.runners.remove(index))
    }

    /// Remove and return every runner for which `remove` returns true.
    pub(crate) fn drain_where<F>(&mut self, mut remove: F) -> Vec<Runner>
    where
        F: FnMut(&Runner) -> bool,
    {
        let (removed, kept): (Vec<Runner>, Vec<Runner>) =
            std::mem::take(&mut self.runners).into_iter().partition(|runner| remove(runner));
        self.runners = kept;
        removed
    }

    /// True when every runner has forfeited or finished.
    pub fn is_finished(&self) -> bool {
        self.runners.iter().all(|runner| runner.is_forfeited() || runner.is_finished())
    }

    /// Whether every runner has recorded, forfeited or been ignored for
    /// `checkpoint`.
    pub fn completed(&self, checkpoint: &Checkpoint) -> bool {
        self.runners.iter().all(|runner| Self::runner_completed(runner, checkpoint))
    }

    /// [`completed`](Self::completed) restricted to `subset`.
    pub fn completed_by(&self, checkpoint: &Checkpoint, subset: &[&Runner]) -> bool {
        subset.iter().all(|runner| Self::runner_completed(runner, checkpoint))
    }

    fn runner_completed(runner: &Runner, checkpoint: &Checkpoint) -> bool {
        runner.has_split(checkpoint) || runner.is_forfeited() || runner.is_ignored()
    }

    /// Runners whose handle is in `handles`, skipping any that no longer
    /// resolve.
    pub fn resolve<'a>(&'a self, handles: impl IntoIterator<Item = &'a str>) -> Vec<&'a Runner> {
        handles.into_iter().filter_map(|handle| self.get(handle)).collect()
    }

    /// Record a split. A skip toggles: it undoes an existing value, otherwise
    /// it is stored. Returns whether the runner was found.
    pub fn apply_split_event(&mut self, alias: &str, checkpoint: &Checkpoint, timestamp: Timestamp) -> bool {
        let Some(runner) = self.get_mut(alias) else {
            debug!(runner = alias, checkpoint = checkpoint.name(), "split from unknown runner");
            return false;
        };

        if timestamp.is_concrete() {
            info!(runner = runner.name(), checkpoint = checkpoint.name(), time = %timestamp, "split recorded");
            runner.record_split(checkpoint, timestamp);
        } else if runner.remove_split(checkpoint).is_some() {
            info!(runner = runner.name(), checkpoint = checkpoint.name(), "split undone");
        } else {
            info!(runner = runner.name(), checkpoint = checkpoint.name(), "split skipped");
            runner.record_split(checkpoint, timestamp);
        }
        true
    }

    /// Record a finish under `terminal`. Skips are ignored. Returns whether the
    /// finish was applied.
    pub fn apply_finish_event(&mut self, alias: &str, terminal: &Checkpoint, timestamp: Timestamp) -> bool {
        if timestamp.is_skipped() {
            return false;
        }
        let Some(runner) = self.get_mut(alias) else {
            debug!(runner = alias, "finish from unknown runner");
            return false;
        };

        info!(runner = runner.name(), time = %timestamp, "runner finished");
        runner.record_split(terminal, timestamp);
        runner.mark_finished();
        runner.set_ignored(false);
        true
    }

    /// Runners whose watch list just completed `checkpoint`.
    ///
    /// Each returned runner is marked so the same checkpoint name never fires
    /// for it again.
    pub fn subset_announce_candidates(&mut self, checkpoint: &Checkpoint) -> Vec<SubsetWatch> {
        let ready: Vec<(usize, SubsetWatch)> = self
            .runners
            .iter()
            .enumerate()
            .filter(|(_, runner)| {
                !runner.watched().is_empty()
                    && !runner.is_forfeited()
                    && !runner.has_announced_watched(checkpoint.name())
            })
            .filter_map(|(index, runner)| {
                let watched = self.resolve(runner.watched().iter().map(String::as_str));
                if watched.is_empty() || !self.completed_by(checkpoint, &watched) {
                    return None;
                }
                let watch = SubsetWatch {
                    handle: runner.handle().to_string(),
                    watched: watched.iter().map(|runner| runner.handle().to_string()).collect(),
                };
                Some((index, watch))
            })
            .collect();

        ready
            .into_iter()
            .map(|(index, watch)| {
                self.runners[index].mark_announced_watched(checkpoint.name());
                watch
            })
            .collect()
    }

    /// `(should_announce, race_is_finished)` for `checkpoint`.
    pub fn global_announce_eligible(&self, checkpoint: &Checkpoint) -> (bool, bool) {
        let announce = self.completed(checkpoint);
        let finished = announce && checkpoint.is_terminal() && self.is_finished();
        (announce, finished)
    }

    /// Overall standings, one line per runner, best first.
    ///
    /// Forfeited runners, and in finished mode unfinished ones, are placed
    /// `N/A`.
    pub fn overall_standings(&self, finished_mode: bool, with_comments: bool) -> Vec<String> {
        let mut sorted: Vec<&Runner> = self.runners.iter().collect();
        sorted.sort_by_cached_key(|runner| runner.latest_progress_key());

        sorted
            .iter()
            .enumerate()
            .map(|(index, runner)| {
                let line = runner.standing_line(finished_mode, with_comments);
                if runner.is_forfeited() || (finished_mode && !runner.is_finished()) {
                    format!("N/A. {line}")
                } else {
                    format!("{}. {line}", index + 1)
                }
            })
            .collect()
    }

    /// Standings at one checkpoint for `subset`, rendered on a single line.
    pub fn split_standings(&self, checkpoint: &Checkpoint, subset: &[&Runner]) -> String {
        let mut ranked: Vec<&Runner> = subset
            .iter()
            .copied()
            .filter(|runner| runner.split_time_for(checkpoint).is_some())
            .collect();
        ranked.sort_by_cached_key(|runner| runner.fixed_checkpoint_key(checkpoint));

        let mut text = format!("{} split standings: ", checkpoint.name());
        for (index, runner) in ranked.iter().enumerate() {
            let Some(entry) = runner.split_line(checkpoint) else {
                continue;
            };
            if runner.is_forfeited() {
                text.push_str(&format!("N/A. {entry}. "));
            } else {
                text.push_str(&format!("{}. {entry}. ", index + 1));
            }
        }
        text.trim_end().to_string()
    }

    /// Final standings with comments, newline separated. Spoilers are wrapped
    /// in `||`.
    pub fn standings(&self, spoiler: bool) -> String {
        let placements = self.overall_standings(true, true).join("\n");
        if spoiler { format!("||{placements}||") } else { placements }
    }

    /// Returns whether the runner was found.
    pub fn set_ignored(&mut self, alias: &str, ignored: bool) -> bool {
        match self.get_mut(alias) {
            Some(runner) => {
                runner.set_ignored(ignored);
                true
            }
            None => false,
        }
    }

    /// Replace `watcher`'s watch list from a comma separated list of aliases.
    ///
    /// Each alias is stored as the matched runner's chat handle; unknown
    /// aliases and runners without a handle are dropped. Returns `None` when
    /// the watcher is not in the race.
    pub fn set_watchlist(&mut self, watcher: &str, aliases: &str) -> Option<BTreeSet<String>> {
        let watched: BTreeSet<String> = aliases
            .split(',')
            .map(str::trim)
            .filter_map(|alias| self.get(alias))
            .filter(|runner| !runner.handle().is_empty())
            .map(|runner| runner.handle().to_string())
            .collect();

        let target = self.get_mut(watcher)?;
        info!(watcher = target.name(), ?watched, "watch list updated");
        target.set_watched(watched.clone());
        Some(watched)
    }

    pub fn watchlist(&self, watcher: &str) -> Option<&BTreeSet<String>> {
        self.get(watcher).map(Runner::watched)
    }

    /// Returns whether the watcher was found.
    pub fn reset_watchlist(&mut self, watcher: &str) -> bool {
        match self.get_mut(watcher) {
            Some(runner) => {
                runner.set_watched(BTreeSet::new());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::EntrantStatus;
    use crate::types::SplitCatalog;
    use proptest::prelude::*;

    fn ts(text: &str) -> Timestamp {
        Timestamp::parse(text).unwrap()
    }

    fn registry() -> RunnerRegistry {
        let mut registry = RunnerRegistry::new();
        registry.insert(Runner::new("vidgmaddiict", "vidgmaddiict"));
        registry.insert(Runner::new("Yujito", "yujitoo"));
        registry.insert(Runner::new("Abdalain", "abdalain"));
        registry.insert(Runner::new("Sidosh", "sidosh"));
        registry
    }

    fn submit_nido(registry: &mut RunnerRegistry, catalog: &SplitCatalog) {
        let nido = catalog.get("Nido").unwrap();
        registry.apply_split_event("sidosh", nido, ts(r#"RealTime "Nido" 7:03.24"#));
        registry.apply_split_event("yujito", nido, ts(r#"RealTime "Nido" 7:10.30"#));
        registry.apply_split_event("abdalain", nido, ts(r#"RealTime "Nidoran" 7:15.38"#));
        registry.apply_split_event("vidgmaddiict", nido, ts(r#"RealTime "Nidoran" 7:20.01"#));
    }

    #[test]
    fn live_standings_rank_by_progress() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let nido = catalog.get("Nido").unwrap();
        let mut registry = registry();
        registry.apply_split_event("sidosh", nido, ts(r#"RealTime "Nido" 7:03.24"#));
        registry.apply_split_event("yujito", nido, ts(r#"RealTime "Nido" 7:10.30"#));

        assert_eq!(
            registry.overall_standings(false, false),
            vec![
                "1. Sidosh: (Nidoran 07:03.24)",
                "2. Yujito: (Nidoran 07:10.30)",
                "3. Abdalain: (N/A)",
                "4. vidgmaddiict: (N/A)",
            ]
        );

        registry.get_mut("sidosh").unwrap().update_status(&EntrantStatus::Forfeit);
        assert_eq!(
            registry.overall_standings(false, false),
            vec![
                "1. Yujito: (Nidoran 07:10.30)",
                "2. Abdalain: (N/A)",
                "3. vidgmaddiict: (N/A)",
                "N/A. Sidosh: (Forfeit)",
            ]
        );
    }

    #[test]
    fn split_standings_render() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let nido = catalog.get("Nido").unwrap();
        let mut registry = registry();
        submit_nido(&mut registry, &catalog);

        let all: Vec<&Runner> = registry.iter().collect();
        assert_eq!(
            registry.split_standings(nido, &all),
            "Nidoran split standings: 1. Sidosh - 07:03.24. 2. Yujito - 07:10.30. \
             3. Abdalain - 07:15.38. 4. vidgmaddiict - 07:20.01."
        );

        registry.get_mut("yujito").unwrap().update_status(&EntrantStatus::Forfeit);
        registry.set_ignored("abdalain", true);
        let all: Vec<&Runner> = registry.iter().collect();
        assert_eq!(
            registry.split_standings(nido, &all),
            "Nidoran split standings: 1. Sidosh - 07:03.24. 2. vidgmaddiict - 07:20.01. \
             3. Abdalain - N/A. N/A. Yujito - Forfeit."
        );
    }

    #[test]
    fn skip_toggles() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let brock = catalog.get("Brock").unwrap();
        let skip = ts(r#"RealTime "Brock" -"#);
        let mut registry = registry();

        registry.apply_split_event("sidosh", brock, skip.clone());
        assert!(registry.get("sidosh").unwrap().has_split(brock));
        registry.apply_split_event("sidosh", brock, skip.clone());
        assert!(!registry.get("sidosh").unwrap().has_split(brock));
        registry.apply_split_event("sidosh", brock, skip);
        assert!(registry.get("sidosh").unwrap().has_split(brock));

        let all: Vec<&Runner> = registry.iter().collect();
        assert_eq!(registry.split_standings(brock, &all), "Brock split standings: 1. Sidosh - Skipped.");
    }

    #[test]
    fn global_announcement_and_finish() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let done = catalog.terminal();
        let nido = catalog.get("Nido").unwrap();
        let mut registry = registry();

        assert_eq!(registry.global_announce_eligible(nido), (false, false));
        submit_nido(&mut registry, &catalog);
        assert_eq!(registry.global_announce_eligible(nido), (true, false));

        assert!(registry.apply_finish_event("sidosh", done, ts("RealTime 01:52:51.24")));
        assert!(registry.apply_finish_event("yujito", done, ts("RealTime 01:53:00.30")));
        assert!(!registry.apply_finish_event("abdalain", done, ts("RealTime -")));
        assert!(registry.apply_finish_event("abdalain", done, ts("RealTime 01:54:30.21")));
        assert_eq!(registry.global_announce_eligible(done), (false, false));

        registry.get_mut("vidgmaddiict").unwrap().update_status(&EntrantStatus::Forfeit);
        assert_eq!(registry.global_announce_eligible(done), (true, true));
        assert_eq!(
            registry.overall_standings(true, false),
            vec![
                "1. Sidosh: (01:52:51.24)",
                "2. Yujito: (01:53:00.30)",
                "3. Abdalain: (01:54:30.21)",
                "N/A. vidgmaddiict: (Forfeit)",
            ]
        );
    }

    #[test]
    fn finished_mode_marks_unfinished_runners() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let mut registry = registry();
        registry.apply_finish_event("sidosh", catalog.terminal(), ts("RealTime 01:52:51.24"));
        registry.get_mut("abdalain").unwrap().set_message("reset at Brock");

        let standings = registry.overall_standings(true, true);
        assert_eq!(standings[0], "1. Sidosh: (01:52:51.24)");
        assert!(standings.contains(&"N/A. vidgmaddiict: (N/A)".to_string()));
        assert!(standings.contains(&"N/A. Abdalain: (N/A) (reset at Brock)".to_string()));
    }

    #[test]
    fn spoiler_standings_are_wrapped() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let done = catalog.terminal();
        let mut registry = registry();
        registry.apply_finish_event("sidosh", done, ts("RealTime 01:50:03.24"));
        registry.apply_finish_event("yujito", done, ts("RealTime 01:51:10.30"));
        registry.get_mut("abdalain").unwrap().update_status(&EntrantStatus::Forfeit);
        registry.get_mut("vidgmaddiict").unwrap().update_status(&EntrantStatus::Forfeit);

        assert_eq!(
            registry.standings(true),
            "||1. Sidosh: (01:50:03.24)\n2. Yujito: (01:51:10.30)\n\
             N/A. Abdalain: (Forfeit)\nN/A. vidgmaddiict: (Forfeit)||"
        );
    }

    #[test]
    fn subset_candidates_fire_once() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let nido = catalog.get("Nido").unwrap();
        let mut registry = registry();
        registry.set_watchlist("sidosh", "abdalain");

        registry.apply_split_event("yujito", nido, ts(r#"RealTime "Nido" 7:10.30"#));
        assert!(registry.subset_announce_candidates(nido).is_empty());

        registry.apply_split_event("abdalain", nido, ts(r#"RealTime "Nido" 7:15.38"#));
        assert_eq!(
            registry.subset_announce_candidates(nido),
            vec![SubsetWatch { handle: "sidosh".into(), watched: vec!["abdalain".into()] }]
        );
        assert!(registry.subset_announce_candidates(nido).is_empty());
    }

    #[test]
    fn subset_watch_list_that_resolves_to_nobody_never_fires() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let nido = catalog.get("Nido").unwrap();
        let mut registry = registry();
        registry.set_watchlist("sidosh", "abdalain");
        registry.remove("abdalain");

        assert!(registry.subset_announce_candidates(nido).is_empty());
    }

    #[test]
    fn watchlists() {
        let mut registry = registry();
        let watched = registry.set_watchlist("abdalain", "sidosh, yujito, nobody").unwrap();
        assert_eq!(watched, BTreeSet::from(["sidosh".to_string(), "yujitoo".to_string()]));
        assert_eq!(registry.watchlist("Abdalain"), Some(&watched));

        assert!(registry.set_watchlist("nobody", "sidosh").is_none());
        assert!(registry.reset_watchlist("abdalain"));
        assert!(registry.watchlist("abdalain").unwrap().is_empty());
        assert!(!registry.reset_watchlist("nobody"));
    }

    #[test]
    fn ignore_counts_as_completed() {
        let catalog = SplitCatalog::pokemon_red_blue();
        let nido = catalog.get("Nido").unwrap();
        let mut registry = registry();
        for alias in ["sidosh", "yujito", "abdalain"] {
            registry.apply_split_event(alias, nido, ts(r#"RealTime "Nido" 7:10.30"#));
        }
        assert!(!registry.completed(nido));
        assert!(registry.set_ignored("vidgmaddiict", true));
        assert!(registry.completed(nido));
        assert!(!registry.set_ignored("nobody", true));
    }

    proptest! {
        #[test]
        fn forfeited_runners_sort_last(times in proptest::collection::vec(1u32..60, 2..6), forfeit in 0usize..6) {
            let catalog = SplitCatalog::pokemon_red_blue();
            let nido = catalog.get("Nido").unwrap();
            let mut registry = RunnerRegistry::new();
            for (index, minutes) in times.iter().enumerate() {
                let name = format!("runner{index}");
                registry.insert(Runner::new(name.clone(), &name));
                let split = ts(&format!("RealTime \"Nido\" {minutes}:00.00"));
                registry.apply_split_event(&name, nido, split);
            }
            let forfeit = forfeit % times.len();
            registry.get_mut(&format!("runner{forfeit}")).unwrap().update_status(&EntrantStatus::Forfeit);

            let standings = registry.overall_standings(false, false);
            prop_assert_eq!(standings.len(), times.len());
            prop_assert_eq!(standings.last().unwrap(), &format!("N/A. runner{forfeit}: (Forfeit)"));
            prop_assert!(standings[..standings.len() - 1].iter().all(|line| !line.starts_with("N/A")));
        }

        #[test]
        fn blank_runners_sort_after_progressed(skipped in 1u32..60) {
            let catalog = SplitCatalog::pokemon_red_blue();
            let nido = catalog.get("Nido").unwrap();
            let brock = catalog.get("Brock").unwrap();
            let mut registry = RunnerRegistry::new();
            registry.insert(Runner::new("Blank", "blank"));
            registry.insert(Runner::new("Skipper", "skipper"));
            registry.apply_split_event("skipper", nido, ts(&format!("RealTime \"Nido\" {skipped}:00.00")));
            registry.apply_split_event("skipper", brock, ts("RealTime \"Brock\" -"));

            let standings = registry.overall_standings(false, false);
            prop_assert!(standings[0].starts_with("1. Skipper"));
            prop_assert_eq!(&standings[1], "2. Blank: (N/A)");
        }
    }
}
