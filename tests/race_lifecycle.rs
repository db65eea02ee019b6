//! End-to-end tests for the tracker
//!
//! These drive races through the public API the way a chat bot would: watch a
//! race, feed livesplit relay traffic, query standings and tear down.

use std::collections::BTreeSet;

use splitwatch::discovery::GameInfo;
use splitwatch::providers::MemoryServices;
use splitwatch::{
    Entrant, EntrantStatus, RaceError, RaceListing, RaceStore, Tracker, TrackerConfig, WatchFlags,
};
use tokio_stream::StreamExt;

const RACE_ID: &str = "q7bsl";
const FEED: &str = "#srl-q7bsl-livesplit";

fn listing(id: &str, entrants: Vec<Entrant>) -> RaceListing {
    let mut listing = RaceListing::with_entrants(id, entrants);
    listing.game = GameInfo { id: 6, name: "Pokémon Red/Blue".to_string(), abbrev: "pkmnredblue".to_string() };
    listing.goal = "any% glitchless".to_string();
    listing.time = 1_624_728_151;
    listing
}

fn fixture() -> (MemoryServices, Tracker) {
    let _ = tracing_subscriber::fmt::try_init();

    let memory = MemoryServices::new();
    memory.discovery.set_race(listing(
        RACE_ID,
        vec![
            Entrant::new("vidgmaddiict", "vidgmaddiict", EntrantStatus::Ready),
            Entrant::new("Yujito", "yujitoo", EntrantStatus::Ready),
            Entrant::new("Abdalain", "abdalain", EntrantStatus::Ready),
            Entrant::new("Sidosh", "sidosh", EntrantStatus::Ready),
        ],
    ));
    let tracker = Tracker::new(memory.services(), TrackerConfig::default()).unwrap();
    (memory, tracker)
}

async fn relay_all(tracker: &Tracker, command: &str, reports: &[(&str, &str)]) {
    for (runner, body) in reports {
        assert!(tracker.handle_relay(FEED, runner, command, body).await.unwrap());
    }
    // Jobs queue behind relay events, so this returns once they are applied.
    tracker.set_spoiler(RACE_ID, false).await.unwrap();
}

async fn split_nido(tracker: &Tracker) {
    relay_all(
        tracker,
        "time",
        &[
            ("Sidosh", r#"RealTime "Nido" 7:03.24"#),
            ("yujito", r#"RealTime "Nido" 7:10.30"#),
            ("abdalain", r#"RealTime "Nidoran" 7:15.38"#),
            ("vidgmaddiict", r#"RealTime "Nidoran" 7:20.01"#),
        ],
    )
    .await;
}

async fn finish_everyone(tracker: &Tracker) {
    relay_all(
        tracker,
        "done",
        &[
            ("sidosh", "RealTime 01:52:51.24"),
            ("yujito", "RealTime 01:53:00.30"),
            ("abdalain", "RealTime 01:54:30.21"),
            ("vidgmaddiict", "RealTime 01:55:49.00"),
        ],
    )
    .await;
}

#[tokio::test]
async fn watch_reports_the_race() {
    let (memory, tracker) = fixture();

    let watched = tracker.watch("Sidosh", WatchFlags::from_args(["silent", "spoiler"])).await.unwrap();

    assert_eq!(watched.race_id, RACE_ID);
    assert_eq!(
        watched.to_string(),
        "Found a race! ID: q7bsl\n\
         Pokémon Red/Blue Race - any% glitchless, with 4 racers: Abdalain, Sidosh, Yujito, vidgmaddiict. Status: In Progress\n\
         This race will now be tracked silently and marked as a spoiler"
    );
    assert!(memory.split_feed.is_subscribed("srl-q7bsl-livesplit"));
    assert!(memory.store.is_tracked(RACE_ID).await.unwrap());
    assert_eq!(memory.chat.subscribed().len(), 4);
    assert_eq!(tracker.race_ids(), vec![RACE_ID.to_string()]);
}

#[tokio::test]
async fn watch_rejects_duplicates_and_strangers() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    assert!(matches!(
        tracker.watch("yujitoo", WatchFlags::default()).await,
        Err(RaceError::AlreadyTracked { race_id, .. }) if race_id == RACE_ID
    ));
    assert!(matches!(
        tracker.watch("nobody", WatchFlags::default()).await,
        Err(RaceError::NoRaceForUser { .. })
    ));

    let mut other_game = listing("zz9pl", vec![Entrant::new("Someone", "someone", EntrantStatus::Entered)]);
    other_game.game.id = 7;
    memory.discovery.set_race(other_game);
    assert!(matches!(
        tracker.watch("someone", WatchFlags::default()).await,
        Err(RaceError::NoRaceForUser { .. })
    ));
}

#[tokio::test]
async fn watch_surfaces_discovery_failures() {
    let (memory, tracker) = fixture();
    memory.discovery.set_unavailable(true);

    assert!(matches!(tracker.watch("sidosh", WatchFlags::default()).await, Err(RaceError::Upstream { .. })));
    assert!(tracker.race_ids().is_empty());
}

#[tokio::test]
async fn relay_traffic_is_announced() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    split_nido(&tracker).await;

    assert_eq!(memory.chat.publish_count(), 4);
    let standings = tracker.standings_for_channel("Abdalain").await.unwrap().unwrap();
    assert_eq!(
        standings,
        "1. Sidosh: (Nidoran 07:03.24) 2. Yujito: (Nidoran 07:10.30) 3. Abdalain: (Nidoran 07:15.38) 4. vidgmaddiict: (Nidoran 07:20.01)"
    );
}

#[tokio::test]
async fn silent_race_posts_nothing() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::from_args(["silent"])).await.unwrap();

    split_nido(&tracker).await;

    assert_eq!(memory.chat.publish_count(), 0);
    tracker.set_silenced(RACE_ID, false).await.unwrap();
}

#[tokio::test]
async fn relay_messages_outside_races_are_ignored() {
    let (_memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    assert!(!tracker.handle_relay("#speedrunslive", "sidosh", "time", r#"RealTime "Nido" 7:03.24"#).await.unwrap());
    assert!(!tracker.handle_relay("#srl-abcde-livesplit", "sidosh", "time", r#"RealTime "Nido" 7:03.24"#).await.unwrap());
    assert!(!tracker.handle_relay(FEED, "sidosh", "time", r#"GameTime "Nido" 7:03.24"#).await.unwrap());
    assert!(!tracker.handle_relay(FEED, "sidosh", "hello", "").await.unwrap());
    assert!(tracker.handle_relay(FEED, "racefan", "join", "").await.unwrap());
}

#[tokio::test]
async fn join_picks_up_new_entrants() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    memory.discovery.update_race(RACE_ID, |race| {
        let entrant = Entrant::new("Latecomer", "latecomer", EntrantStatus::Ready);
        race.entrants.insert(entrant.display_name.clone(), entrant);
    });
    relay_all(&tracker, "join", &[("latecomer", "")]).await;

    let summary = tracker.summary(RACE_ID).unwrap();
    assert_eq!(summary.runners.len(), 5);
    assert!(summary.chat_watchers.contains("latecomer"));
    assert_eq!(tracker.race_for_channel("Latecomer"), Some(RACE_ID.to_string()));
}

#[tokio::test]
async fn channel_queries() {
    let (_memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    assert_eq!(tracker.race_for_channel("yujitoo"), Some(RACE_ID.to_string()));
    assert_eq!(tracker.race_for_channel("nobody"), None);
    assert_eq!(tracker.standings_for_channel("nobody").await.unwrap(), None);
    assert_eq!(
        tracker.multitwitch_for_channel("sidosh").await.unwrap().as_deref(),
        Some("https://multitwitch.tv/abdalain/sidosh/vidgmaddiict/yujitoo/")
    );
    assert!(tracker.info_for_channel("sidosh").await.unwrap().unwrap().starts_with("Runner info | Abdalain"));
}

#[tokio::test]
async fn external_watcher_follows_the_race() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    assert!(tracker.add_watcher(RACE_ID, "RaceFan").await.unwrap());
    assert!(!tracker.add_watcher(RACE_ID, "racefan").await.unwrap());
    assert!(memory.chat.is_subscribed("racefan"));
    assert_eq!(tracker.race_for_channel("racefan"), Some(RACE_ID.to_string()));

    split_nido(&tracker).await;
    assert_eq!(memory.chat.publish_count(), 5);
}

#[tokio::test]
async fn watch_lists_belong_to_their_owner() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    let watched = tracker.set_watchlist("sidosh", "Sidosh", "abdalain, nobody").await.unwrap();
    assert_eq!(watched, Some(BTreeSet::from(["abdalain".to_string()])));
    assert_eq!(tracker.set_watchlist("sidosh", "yujitoo", "abdalain").await.unwrap(), None);
    assert_eq!(tracker.watchlist("sidosh", "sidosh").await.unwrap().map(|set| set.len()), Some(1));

    relay_all(
        &tracker,
        "time",
        &[("sidosh", r#"RealTime "Nido" 7:03.24"#), ("abdalain", r#"RealTime "Nido" 7:15.38"#)],
    )
    .await;
    assert_eq!(memory.chat.published(), vec![(
        "sidosh".to_string(),
        "Nidoran split standings: 1. Abdalain - 07:15.38.".to_string()
    )]);

    assert!(tracker.reset_watchlist("sidosh", "sidosh").await.unwrap());
    assert_eq!(tracker.watchlist("sidosh", "sidosh").await.unwrap(), Some(BTreeSet::new()));
}

#[tokio::test]
async fn race_commands_validate_input() {
    let (_memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    assert!(matches!(
        tracker.set_ignored(RACE_ID, "nobody", true).await,
        Err(RaceError::RunnerNotFound { .. })
    ));
    assert!(matches!(
        tracker.force_finish(RACE_ID, "sidosh", "whenever").await,
        Err(RaceError::Parse { .. })
    ));
    assert!(matches!(tracker.update_comments(RACE_ID).await, Err(RaceError::RaceNotFinished { .. })));
    assert!(matches!(tracker.refresh("abcde").await, Err(RaceError::RaceNotFound { .. })));
}

#[tokio::test]
async fn finished_race_posts_results() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();
    let mut updates = tracker.summary_updates(RACE_ID).unwrap();
    assert!(!updates.next().await.unwrap().finished);

    finish_everyone(&tracker).await;

    assert!(tracker.summary(RACE_ID).unwrap().finished);
    assert!(memory.store.is_finished(RACE_ID).await.unwrap());
    assert_eq!(memory.results.post_count(), 2);
    assert!(memory.chat.subscribed().is_empty());
    assert!(!memory.split_feed.is_subscribed("srl-q7bsl-livesplit"));
    assert_eq!(tracker.race_for_channel("sidosh"), None);

    tracker.update_comments(RACE_ID).await.unwrap();
    assert_eq!(memory.results.edits().len(), 1);

    tracker.set_spoiler(RACE_ID, true).await.unwrap();
    let results = tracker.post_results(RACE_ID).await.unwrap();
    assert!(results.starts_with("Race q7bsl results:\n\n||1. Sidosh: (01:52:51.24)"));

    assert_eq!(tracker.shutdown().await.unwrap(), 0);
}

#[tokio::test]
async fn forced_finish_closes_the_race() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();

    tracker.force_finish(RACE_ID, "vidgmaddiict", "forfeit").await.unwrap();
    for (runner, time) in [("sidosh", "1:52:51.24"), ("yujito", "1:53:00.30"), ("abdalain", "1:54:30.21")] {
        tracker.force_finish(RACE_ID, runner, time).await.unwrap();
    }

    assert!(tracker.summary(RACE_ID).unwrap().finished);
    assert_eq!(memory.store.finish_mark_count(), 1);
    assert!(memory.results.live_posts()[0].ends_with("N/A. vidgmaddiict: (Forfeit)"));
}

#[tokio::test]
async fn unwatch_stops_the_race() {
    let (memory, tracker) = fixture();
    assert!(matches!(tracker.unwatch(RACE_ID).await, Err(RaceError::NotTracked { .. })));

    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();
    tracker.unwatch(RACE_ID).await.unwrap();

    assert!(tracker.race_ids().is_empty());
    assert!(!memory.store.is_tracked(RACE_ID).await.unwrap());
    assert!(memory.chat.subscribed().is_empty());
    assert_eq!(memory.split_feed.unsubscribe_count(), 1);
    assert!(matches!(tracker.set_silenced(RACE_ID, true).await, Err(RaceError::RaceNotFound { .. })));

    // The race can be picked up again afterwards.
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();
}

#[tokio::test]
async fn unwatching_a_finished_race_leaves_channels_once() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();
    finish_everyone(&tracker).await;
    let unsubscribed = memory.chat.unsubscribe_count();

    tracker.unwatch(RACE_ID).await.unwrap();

    assert_eq!(unsubscribed, 4);
    assert_eq!(memory.chat.unsubscribe_count(), 4);
    assert_eq!(memory.split_feed.unsubscribe_count(), 1);
    assert!(tracker.race_ids().is_empty());
}

#[tokio::test]
async fn shutdown_surfaces_store_failures() {
    let (memory, tracker) = fixture();
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();
    memory.store.set_failing(true);

    let err = tracker.shutdown().await.unwrap_err();

    assert!(matches!(err, RaceError::Store { .. }));
    assert!(tracker.race_ids().is_empty());
}

#[tokio::test]
async fn shutdown_counts_unfinished_races() {
    let (memory, tracker) = fixture();
    memory.discovery.set_race(listing("a1b2c", vec![Entrant::new("Other", "other", EntrantStatus::Ready)]));
    tracker.watch("sidosh", WatchFlags::default()).await.unwrap();
    tracker.watch("other", WatchFlags::default()).await.unwrap();

    assert_eq!(tracker.shutdown().await.unwrap(), 2);
    assert!(tracker.race_ids().is_empty());
    assert!(!memory.store.is_tracked(RACE_ID).await.unwrap());
    assert!(!memory.store.is_tracked("a1b2c").await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn races_run_independently() {
    let (memory, tracker) = fixture();
    memory.discovery.set_race(listing(
        "a1b2c",
        vec![
            Entrant::new("Other", "other", EntrantStatus::Ready),
            Entrant::new("Sidosh", "sidosh", EntrantStatus::Ready),
        ],
    ));
    // Both races share sidosh's channel.
    tracker.watch("yujitoo", WatchFlags::default()).await.unwrap();
    tracker.watch("other", WatchFlags::default()).await.unwrap();

    tokio::join!(finish_everyone(&tracker), async {
        for runner in ["other", "sidosh"] {
            let body = r#"RealTime "Brock" 15:00.00"#;
            tracker.handle_relay("srl-a1b2c-livesplit", runner, "time", body).await.unwrap();
        }
    });

    assert!(tracker.summary(RACE_ID).unwrap().finished);
    assert!(!tracker.summary("a1b2c").unwrap().finished);
    assert!(memory.chat.is_subscribed("sidosh"));
    assert_eq!(tracker.race_for_channel("sidosh"), Some("a1b2c".to_string()));
}
