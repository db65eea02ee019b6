//! Error types for race tracking.
//!
//! Every fallible operation in the crate returns [`RaceError`]. Variants carry
//! structured context so the command layer can reply with their display string
//! directly ("Could not find race q7bsl") and so callers can decide whether a
//! failed collaborator call is worth attempting again on a later event.
//!
//! ## Error Categories
//!
//! - **Parse Errors**: malformed timestamps, discovery payloads or relay input
//! - **Missing Entities**: unknown race ids or runner aliases
//! - **Upstream Errors**: the discovery source could not be reached
//! - **Delivery Errors**: a chat relay or result destination rejected a message
//! - **Store Errors**: the tracked-race store failed
//! - **Configuration Errors**: invalid YAML or catalog definitions
//!
//! ## Recovery
//!
//! ```rust
//! use splitwatch::RaceError;
//!
//! let error = RaceError::upstream("discovery returned 503");
//! assert!(error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use thiserror::Error;

/// Result type alias for race operations.
pub type Result<T, E = RaceError> = std::result::Result<T, E>;

/// Main error type for race operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RaceError {
    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Could not find race {race_id}")]
    RaceNotFound { race_id: String },

    #[error("Could not find user {runner} in race {race_id}")]
    RunnerNotFound { runner: String, race_id: String },

    #[error("Unable to find a race involving user {user}")]
    NoRaceForUser { user: String },

    #[error("Already watching {race_id}:\n{summary}")]
    AlreadyTracked { race_id: String, summary: String },

    #[error("Currently not tracking a race with id: {race_id}")]
    NotTracked { race_id: String },

    #[error("Race {race_id} is not finished.")]
    RaceNotFinished { race_id: String },

    #[error("Race {race_id} is no longer running")]
    RaceClosed { race_id: String },

    #[error("Discovery source unavailable: {reason}")]
    Upstream {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to deliver message to {target}: {reason}")]
    Delivery {
        target: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Race store failed during {operation}: {reason}")]
    Store { operation: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RaceError {
    /// Returns whether the failed operation may succeed on a later event.
    pub fn is_retryable(&self) -> bool {
        match self {
            RaceError::Upstream { .. } => true,
            RaceError::Delivery { .. } => true,
            RaceError::Store { .. } => true,
            RaceError::Parse { .. } => false,
            RaceError::RaceNotFound { .. } => false,
            RaceError::RunnerNotFound { .. } => false,
            RaceError::NoRaceForUser { .. } => false,
            RaceError::AlreadyTracked { .. } => false,
            RaceError::NotTracked { .. } => false,
            RaceError::RaceNotFinished { .. } => false,
            RaceError::RaceClosed { .. } => false,
            RaceError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RaceError::Parse { .. } => vec![
                "Check the livesplit message format",
                "Verify the checkpoint name matches the catalog or one of its aliases",
            ],
            RaceError::RaceNotFound { .. } | RaceError::NotTracked { .. } => vec![
                "Check the race id",
                "Start tracking the race with a watch request first",
            ],
            RaceError::RunnerNotFound { .. } => vec![
                "Check the runner's display name or chat handle",
                "Refresh the race roster",
            ],
            RaceError::NoRaceForUser { .. } => vec![
                "Make sure the runner has entered an open race",
                "Check the runner's chat handle is linked on the racing site",
            ],
            RaceError::AlreadyTracked { .. } => vec!["Use the existing race id"],
            RaceError::RaceNotFinished { .. } => vec!["Wait for every runner to finish or forfeit"],
            RaceError::RaceClosed { .. } => vec!["Watch the race again to restart tracking"],
            RaceError::Upstream { .. } => vec![
                "The next split or roster event retries automatically",
                "Check the discovery API status",
            ],
            RaceError::Delivery { .. } => vec![
                "Check the chat connection",
                "Verify the bot has permission to post in the channel",
            ],
            RaceError::Store { .. } => vec!["Check the race store is writable"],
            RaceError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Make sure the catalog has unique positions and a Done checkpoint",
            ],
        }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        RaceError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for unknown race ids.
    pub fn race_not_found(race_id: impl Into<String>) -> Self {
        RaceError::RaceNotFound { race_id: race_id.into() }
    }

    /// Helper constructor for unknown runner aliases.
    pub fn runner_not_found(runner: impl Into<String>, race_id: impl Into<String>) -> Self {
        RaceError::RunnerNotFound { runner: runner.into(), race_id: race_id.into() }
    }

    /// Helper constructor for discovery failures.
    pub fn upstream(reason: impl Into<String>) -> Self {
        RaceError::Upstream { reason: reason.into(), source: None }
    }

    /// Helper constructor for delivery failures.
    pub fn delivery(target: impl Into<String>, reason: impl Into<String>) -> Self {
        RaceError::Delivery { target: target.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for store failures.
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        RaceError::Store { operation: operation.into(), reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        RaceError::Config { reason: reason.into(), source: None }
    }
}

impl From<serde_json::Error> for RaceError {
    fn from(err: serde_json::Error) -> Self {
        RaceError::Parse { context: "discovery payload".to_string(), details: err.to_string() }
    }
}

impl From<serde_yaml_ng::Error> for RaceError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        RaceError::Config { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
