//! Live speedrun race tracking for chat relays.
//!
//! Splitwatch follows races announced by a race-coordination site, ingests
//! split and finish reports from runners' livesplit clients, and republishes
//! standings to the runners' chat channels once every runner is done with a
//! checkpoint.
//!
//! # Features
//!
//! - **Standings**: overall and per-checkpoint rankings with skip, forfeit and
//!   ignore handling
//! - **Announcements**: each checkpoint announced once, plus personal watch
//!   lists that fire when a chosen subset of runners is through
//! - **Race lifecycle**: roster reconciliation, the finish sequence and
//!   deferred result updates
//! - **Concurrency**: one task per race, all races in parallel
//!
//! # Quick Start
//!
//! The chat network, discovery API, race store and results destination are
//! collaborators behind the traits in [`provider`]. In-memory versions live
//! in [`providers::memory`].
//!
//! ```rust,no_run
//! use splitwatch::providers::MemoryServices;
//! use splitwatch::{Tracker, TrackerConfig, WatchFlags};
//!
//! #[tokio::main]
//! async fn main() -> splitwatch::Result<()> {
//!     splitwatch::logging::init("splitwatch=info")?;
//!
//!     let memory = MemoryServices::new();
//!     let tracker = Tracker::new(memory.services(), TrackerConfig::default())?;
//!     let watched = tracker.watch("sidosh", WatchFlags::from_args(["silent"])).await?;
//!     println!("{watched}");
//!
//!     // Feed livesplit relay traffic in as it arrives.
//!     let channel = format!("srl-{}-livesplit", watched.race_id);
//!     tracker.handle_relay(&channel, "sidosh", "time", r#"RealTime "Nido" 7:03.24"#).await?;
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod config;
pub mod discovery;
mod error;
pub mod logging;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Race engine
pub mod driver;
pub mod race;
pub mod registry;
pub mod relay;
pub mod runner;
pub mod tracker;

// Collaborators
pub mod provider;
pub mod providers;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use config::TrackerConfig;
pub use discovery::{Entrant, EntrantStatus, RaceListing, RaceState};
pub use driver::{RaceDriver, RaceEvent};
pub use provider::{
    Blacklist, ChannelLeases, ChatRelay, DiscoverySource, MessageHandle, RaceStore, ResultPublisher, Services,
};
pub use race::{Audience, Race, RaceSettings, RaceSummary};
pub use registry::{RunnerRegistry, SubsetWatch};
pub use runner::Runner;
pub use tracker::{Tracker, WatchFlags, Watched};
