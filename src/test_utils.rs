//! Fixtures shared by unit tests, integration tests and benchmarks
//!
//! The fixture race mirrors a real four-runner Pokémon Red/Blue race. Sidosh
//! starts out forfeited so tests can bring them back with
//! [`set_entrant_status`].

#![cfg(any(test, feature = "benchmark"))]

use std::sync::Arc;

use crate::discovery::{Entrant, EntrantStatus, GameInfo, RaceListing};
use crate::providers::MemoryServices;
use crate::race::{Race, RaceSettings};
use crate::registry::RunnerRegistry;
use crate::runner::Runner;
use crate::types::{SplitCatalog, SplitTime, Timestamp};

/// Id of the fixture race.
pub const FIXTURE_RACE_ID: &str = "q7bsl";

/// Parse a relay body, panicking on malformed fixtures.
pub fn ts(text: &str) -> Timestamp {
    Timestamp::parse(text).unwrap_or_else(|| panic!("invalid fixture timestamp {text:?}"))
}

/// Split body for `checkpoint` at `time`, as a livesplit client sends it.
pub fn split_body(checkpoint: &str, time: &str) -> String {
    format!("RealTime \"{checkpoint}\" {time}")
}

pub fn fixture_entrants() -> Vec<Entrant> {
    vec![
        Entrant::new("vidgmaddiict", "vidgmaddiict", EntrantStatus::Ready),
        Entrant::new("Yujito", "yujitoo", EntrantStatus::Ready),
        Entrant::new("Abdalain", "abdalain", EntrantStatus::Ready),
        Entrant::new("Sidosh", "sidosh", EntrantStatus::Forfeit),
    ]
}

/// The fixture race as the discovery source lists it.
pub fn fixture_listing() -> RaceListing {
    let mut listing = RaceListing::with_entrants(FIXTURE_RACE_ID, fixture_entrants());
    listing.game = GameInfo { id: 6, name: "Pokémon Red/Blue".to_string(), abbrev: "pkmnredblue".to_string() };
    listing.goal = "any% glitchless".to_string();
    listing.time = 1_450_000_000;
    listing
}

/// In-memory collaborators whose discovery source serves the fixture race.
pub fn fixture_services() -> MemoryServices {
    let memory = MemoryServices::new();
    memory.discovery.set_race(fixture_listing());
    memory
}

/// A fresh, empty race bound to `memory`.
pub fn fixture_race(memory: &MemoryServices) -> Race {
    fixture_race_with(memory, RaceSettings::default())
}

pub fn fixture_race_with(memory: &MemoryServices, settings: RaceSettings) -> Race {
    Race::new(FIXTURE_RACE_ID, Arc::new(SplitCatalog::pokemon_red_blue()), memory.services(), settings)
}

/// Change one fixture entrant's status in the discovery source.
pub fn set_entrant_status(memory: &MemoryServices, display_name: &str, status: EntrantStatus) {
    memory.discovery.update_race(FIXTURE_RACE_ID, |race| {
        if let Some(entrant) = race.entrants.get_mut(display_name) {
            entrant.status = status;
        }
    });
}

/// A registry of `runners` runners, each with a split at every one of the
/// first `checkpoints` reportable checkpoints. Times are spread so rankings
/// differ per checkpoint.
pub fn populated_registry(catalog: &SplitCatalog, runners: usize, checkpoints: usize) -> RunnerRegistry {
    let mut registry = RunnerRegistry::new();
    for index in 0..runners {
        let handle = format!("runner{index:03}");
        let mut runner = Runner::new(format!("Runner{index:03}"), &handle);
        for (position, checkpoint) in catalog.reportable().take(checkpoints).enumerate() {
            let seconds = (position as u32 + 1) * 300 + ((index as u32 * 37 + position as u32 * 11) % 120);
            let split = SplitTime::new(checkpoint.name(), seconds / 3600, seconds / 60 % 60, seconds % 60, 0);
            runner.record_split(checkpoint, Timestamp::Concrete(split));
        }
        registry.insert(runner);
    }
    registry
}
