//! Log subscriber setup for binaries embedding the tracker.

use tracing_subscriber::EnvFilter;

use crate::{RaceError, Result};

/// Install a global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise `default_directive` (for example
/// `"splitwatch=info"`) is used. Fails if a global subscriber is already set.
pub fn init(default_directive: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive).map_err(|e| RaceError::Config {
            reason: format!("invalid log directive {default_directive:?}"),
            source: Some(Box::new(e)),
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| RaceError::Config { reason: "log subscriber already installed".to_string(), source: Some(e) })
}
