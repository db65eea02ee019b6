//! Decoding of livesplit relay messages into race events.
//!
//! Each race has its own relay channel, `srl-<race id>-livesplit`. Runners'
//! livesplit clients post `time` and `done` commands whose bodies are split
//! timestamps, and channel joins and parts hint that the roster changed.

use tracing::{debug, trace};

use crate::Timestamp;
use crate::driver::RaceEvent;

const CHANNEL_PREFIX: &str = "srl-";
const CHANNEL_SUFFIX: &str = "-livesplit";

/// Relay channel for `race_id`.
pub fn split_feed_channel(race_id: &str) -> String {
    format!("{CHANNEL_PREFIX}{race_id}{CHANNEL_SUFFIX}")
}

/// Race id encoded in a relay channel name, with or without a leading `#`.
pub fn race_id_from_channel(channel: &str) -> Option<&str> {
    let channel = channel.strip_prefix('#').unwrap_or(channel);
    let id = channel.strip_prefix(CHANNEL_PREFIX)?.strip_suffix(CHANNEL_SUFFIX)?;
    (!id.is_empty()).then_some(id)
}

/// A decoded relay command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    Split(Timestamp),
    Finish(Timestamp),
    /// Someone joined or left the relay channel.
    RosterChanged,
}

impl RelayCommand {
    /// Decode a command and its body.
    ///
    /// Game-time reports and bodies that are not timestamps are dropped.
    pub fn decode(command: &str, body: &str) -> Option<Self> {
        match command.to_ascii_lowercase().as_str() {
            "time" | "done" if body.contains("GameTime") => {
                trace!(command, "ignoring game time report");
                None
            }
            "time" => Self::timestamp(body).map(RelayCommand::Split),
            "done" => Self::timestamp(body).map(RelayCommand::Finish),
            "join" | "part" => Some(RelayCommand::RosterChanged),
            _ => None,
        }
    }

    fn timestamp(body: &str) -> Option<Timestamp> {
        let timestamp = Timestamp::parse(body);
        if timestamp.is_none() {
            debug!(body, "discarding unparseable relay body");
        }
        timestamp
    }

    /// The race event for this command, reported by `runner`.
    pub fn into_event(self, runner: &str) -> RaceEvent {
        let runner = runner.to_lowercase();
        match self {
            RelayCommand::Split(timestamp) => RaceEvent::Split { runner, timestamp },
            RelayCommand::Finish(timestamp) => RaceEvent::Finish { runner, timestamp },
            RelayCommand::RosterChanged => RaceEvent::Refresh,
        }
    }
}
