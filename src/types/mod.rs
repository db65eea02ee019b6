//! Core value types for split tracking.
//!
//! - [`Timestamp`] is a reported split time, or a sentinel that sorts after
//!   every real time (skipped, blank, forfeited)
//! - [`Checkpoint`] is one named milestone of a run, and [`SplitCatalog`] the
//!   fixed, ordered list of them a race is tracked against
//!
//! ```rust
//! use splitwatch::types::{SplitCatalog, Timestamp};
//!
//! let catalog = SplitCatalog::pokemon_red_blue();
//! let ts = Timestamp::parse(r#"RealTime "Nido" 7:03.24"#).unwrap();
//! let checkpoint = catalog.get(ts.checkpoint_name().unwrap()).unwrap();
//! assert_eq!(checkpoint.name(), "Nidoran");
//! assert_eq!(ts.ordering_value(), 423_240);
//! ```

mod checkpoint;
mod timestamp;

pub use checkpoint::{
    Checkpoint, FORFEIT_CHECKPOINT, NO_PROGRESS_CHECKPOINT, SplitCatalog, TERMINAL_CHECKPOINT,
};
pub use timestamp::{BLANK_ORDER, FORFEIT_ORDER, SKIPPED_ORDER, SplitTime, Timestamp};
