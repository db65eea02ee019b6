//! Split timestamps reported by livesplit.
//!
//! A [`Timestamp`] is either a concrete elapsed time tagged with the checkpoint
//! it was reported for, or one of three sentinels used to push non-completing
//! runners to the bottom of a standings sort.

use std::fmt;

use super::checkpoint::TERMINAL_CHECKPOINT;

/// Sort key of a skipped checkpoint.
pub const SKIPPED_ORDER: u64 = u64::MAX - 2;
/// Sort key of an ignored runner's checkpoint.
pub const BLANK_ORDER: u64 = u64::MAX - 1;
/// Sort key of a forfeited runner's checkpoint.
pub const FORFEIT_ORDER: u64 = u64::MAX;

/// Concrete elapsed time for a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SplitTime {
    pub checkpoint: String,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub millis: u32,
}

impl SplitTime {
    pub fn new(checkpoint: impl Into<String>, hours: u32, minutes: u32, seconds: u32, millis: u32) -> Self {
        Self { checkpoint: checkpoint.into(), hours, minutes, seconds, millis }
    }

    /// Elapsed time in milliseconds.
    pub fn total_millis(&self) -> u64 {
        u64::from(self.millis)
            + u64::from(self.seconds) * 1_000
            + u64::from(self.minutes) * 60_000
            + u64::from(self.hours) * 3_600_000
    }

    /// `HH:MM:SS.cc`, or `MM:SS.cc` when under an hour.
    pub fn time_string(&self) -> String {
        let centis = self.millis / 10;
        if self.hours > 0 {
            format!("{:02}:{:02}:{:02}.{:02}", self.hours, self.minutes, self.seconds, centis)
        } else {
            format!("{:02}:{:02}.{:02}", self.minutes, self.seconds, centis)
        }
    }
}

/// A split time or a sentinel standing in for one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Timestamp {
    Concrete(SplitTime),
    Skipped { checkpoint: String },
    Blank,
    Forfeited,
}

impl Timestamp {
    /// Parse a livesplit relay body.
    ///
    /// Accepts an optional leading `RealTime` keyword followed by either
    /// `"<checkpoint>" <time-or-dash>` or a bare `<time-or-dash>`, in which case
    /// the checkpoint defaults to `Done`. Returns `None` for anything else.
    ///
    /// ```rust
    /// use splitwatch::Timestamp;
    ///
    /// let ts = Timestamp::parse(r#"RealTime "Lance" 1:57:22.20"#).unwrap();
    /// assert_eq!(ts.time_string(), "01:57:22.20");
    /// assert_eq!(ts.checkpoint_name(), Some("Lance"));
    ///
    /// let done = Timestamp::parse("RealTime 2:00:20.78").unwrap();
    /// assert_eq!(done.checkpoint_name(), Some("Done"));
    /// ```
    pub fn parse(text: &str) -> Option<Self> {
        let mut rest = text.trim();
        if let Some(stripped) = rest.strip_prefix("RealTime") {
            rest = stripped.trim_start();
        }

        let (checkpoint, rest) = match rest.strip_prefix('"') {
            Some(quoted) => {
                let end = quoted.find('"')?;
                let name = quoted[..end].trim();
                let name = if name.is_empty() { TERMINAL_CHECKPOINT } else { name };
                (name.to_string(), quoted[end + 1..].trim_start())
            }
            None => (TERMINAL_CHECKPOINT.to_string(), rest),
        };

        let token = rest.split_whitespace().next()?;
        if token == "-" {
            return Some(Timestamp::Skipped { checkpoint });
        }

        let (hours, minutes, seconds, centis) = parse_clock(token)?;
        Some(Timestamp::Concrete(SplitTime::new(checkpoint, hours, minutes, seconds, centis * 10)))
    }

    /// Total-order sort key: real times first, then skips, blanks, forfeits.
    pub fn ordering_value(&self) -> u64 {
        match self {
            Timestamp::Concrete(time) => time.total_millis(),
            Timestamp::Skipped { .. } => SKIPPED_ORDER,
            Timestamp::Blank => BLANK_ORDER,
            Timestamp::Forfeited => FORFEIT_ORDER,
        }
    }

    pub fn time_string(&self) -> String {
        match self {
            Timestamp::Concrete(time) => time.time_string(),
            Timestamp::Skipped { .. } => "Skipped".to_string(),
            Timestamp::Blank => "N/A".to_string(),
            Timestamp::Forfeited => "Forfeit".to_string(),
        }
    }

    /// Name of the checkpoint this timestamp was reported for, if any.
    pub fn checkpoint_name(&self) -> Option<&str> {
        match self {
            Timestamp::Concrete(time) => Some(&time.checkpoint),
            Timestamp::Skipped { checkpoint } => Some(checkpoint),
            Timestamp::Blank | Timestamp::Forfeited => None,
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Timestamp::Concrete(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Timestamp::Skipped { .. })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.checkpoint_name() {
            Some(name) if !name.is_empty() => write!(f, "[{}]: {}", name, self.time_string()),
            _ => f.write_str(&self.time_string()),
        }
    }
}

/// Split `[[H]H:]M[M]:SS.cc` into its numeric groups.
fn parse_clock(token: &str) -> Option<(u32, u32, u32, u32)> {
    let (clock, centis) = token.split_once('.')?;
    let centis = digits(centis, 2, 2)?;

    let groups: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match groups.as_slice() {
        [m, s] => (0, digits(m, 1, 2)?, digits(s, 2, 2)?),
        [h, m, s] => (digits(h, 1, 2)?, digits(m, 1, 2)?, digits(s, 2, 2)?),
        _ => return None,
    };

    Some((hours, minutes, seconds, centis))
}

fn digits(group: &str, min: usize, max: usize) -> Option<u32> {
    if group.len() < min || group.len() > max || !group.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    group.parse().ok()
}
