//! Race listings as the discovery source reports them.
//!
//! The racing site exposes races and their entrants as JSON. These types
//! deserialize that payload directly and convert the free-form entrant status
//! text into [`EntrantStatus`] once, at the boundary.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::Result;

/// Entrant status as reported by the discovery source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntrantStatus {
    Entered,
    Ready,
    Finished,
    Forfeit,
    Unknown,
}

impl EntrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrantStatus::Entered => "Entered",
            EntrantStatus::Ready => "Ready",
            EntrantStatus::Finished => "Finished",
            EntrantStatus::Forfeit => "Forfeit",
            EntrantStatus::Unknown => "Unknown",
        }
    }

    pub fn is_forfeit(&self) -> bool {
        matches!(self, EntrantStatus::Forfeit)
    }

    /// Entrants that have not started or are still waiting in the lobby.
    pub fn is_waiting(&self) -> bool {
        matches!(self, EntrantStatus::Entered | EntrantStatus::Ready)
    }
}

impl From<&str> for EntrantStatus {
    fn from(text: &str) -> Self {
        match text {
            "Entered" => EntrantStatus::Entered,
            "Ready" => EntrantStatus::Ready,
            "Finished" => EntrantStatus::Finished,
            "Forfeit" => EntrantStatus::Forfeit,
            _ => EntrantStatus::Unknown,
        }
    }
}

impl From<String> for EntrantStatus {
    fn from(text: String) -> Self {
        EntrantStatus::from(text.as_str())
    }
}

impl From<EntrantStatus> for String {
    fn from(status: EntrantStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for EntrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a race on the racing site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum RaceState {
    EntryOpen,
    EntryClosed,
    InProgress,
    Complete,
    Terminated,
}

impl RaceState {
    pub fn is_finished(self) -> bool {
        matches!(self, RaceState::Complete | RaceState::Terminated)
    }
}

impl TryFrom<u8> for RaceState {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(RaceState::EntryOpen),
            2 => Ok(RaceState::EntryClosed),
            3 => Ok(RaceState::InProgress),
            4 => Ok(RaceState::Complete),
            5 => Ok(RaceState::Terminated),
            other => Err(format!("unknown race state {other}")),
        }
    }
}

impl From<RaceState> for u8 {
    fn from(state: RaceState) -> Self {
        match state {
            RaceState::EntryOpen => 1,
            RaceState::EntryClosed => 2,
            RaceState::InProgress => 3,
            RaceState::Complete => 4,
            RaceState::Terminated => 5,
        }
    }
}

/// Game a race is run in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GameInfo {
    pub id: u32,
    pub name: String,
    pub abbrev: String,
}

/// One race entrant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entrant {
    #[serde(rename = "displayname")]
    pub display_name: String,
    #[serde(default)]
    pub place: i64,
    #[serde(default)]
    pub time: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(rename = "statetext")]
    pub status: EntrantStatus,
    #[serde(rename = "twitch", default, deserialize_with = "null_as_empty")]
    pub chat_handle: String,
}

impl Entrant {
    pub fn new(display_name: impl Into<String>, chat_handle: impl Into<String>, status: EntrantStatus) -> Self {
        Self {
            display_name: display_name.into(),
            place: 0,
            time: 0,
            message: String::new(),
            status,
            chat_handle: chat_handle.into(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Whether `user` names this entrant by chat handle or display name.
    pub fn is_named(&self, user: &str) -> bool {
        let user = user.to_lowercase();
        (!self.chat_handle.is_empty() && self.chat_handle.to_lowercase() == user)
            || self.display_name.to_lowercase() == user
    }
}

/// One race and its entrants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceListing {
    pub id: String,
    #[serde(default)]
    pub game: GameInfo,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub time: i64,
    pub state: RaceState,
    #[serde(rename = "statetext", default)]
    pub state_text: String,
    #[serde(rename = "numentrants", default)]
    pub entrant_count: u32,
    #[serde(default)]
    pub entrants: BTreeMap<String, Entrant>,
}

#[derive(Deserialize)]
struct RaceList {
    races: Vec<RaceListing>,
}

impl RaceListing {
    /// An in-progress race keyed by entrant display name.
    pub fn with_entrants(id: impl Into<String>, entrants: impl IntoIterator<Item = Entrant>) -> Self {
        let entrants: BTreeMap<String, Entrant> =
            entrants.into_iter().map(|entrant| (entrant.display_name.clone(), entrant)).collect();
        Self {
            id: id.into(),
            game: GameInfo::default(),
            goal: String::new(),
            time: 0,
            state: RaceState::InProgress,
            state_text: "In Progress".to_string(),
            entrant_count: entrants.len() as u32,
            entrants,
        }
    }

    /// Parse a single race payload.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a `{"races": [...]}` payload.
    pub fn list_from_json(json: &str) -> Result<Vec<Self>> {
        let list: RaceList = serde_json::from_str(json)?;
        Ok(list.races)
    }

    /// One-line description used in watch replies.
    pub fn summary(&self) -> String {
        let names: Vec<&str> = self.entrants.values().map(|entrant| entrant.display_name.as_str()).collect();
        format!(
            "{} Race - {}, with {} racers: {}. Status: {}",
            self.game.name,
            self.goal,
            self.entrant_count,
            names.join(", "),
            self.state_text
        )
    }

    /// Whether `user` is a waiting (entered or ready) entrant.
    pub fn has_waiting_entrant(&self, user: &str) -> bool {
        self.entrants.values().any(|entrant| entrant.is_named(user) && entrant.status.is_waiting())
    }
}

/// Newest unfinished race where `user` is a waiting entrant.
///
/// With `game_id` set, races of other games are ignored.
pub fn find_race_with_user<'a>(
    races: &'a [RaceListing],
    user: &str,
    game_id: Option<u32>,
) -> Option<&'a RaceListing> {
    races
        .iter()
        .filter(|race| !race.state.is_finished())
        .filter(|race| game_id.is_none_or(|id| race.game.id == id))
        .filter(|race| race.has_waiting_entrant(user))
        .max_by_key(|race| race.time)
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RACE: &str = r#"{
        "id": "q7bsl",
        "game": {"id": 6, "name": "Pokémon Red/Blue", "abbrev": "pkmnredblue", "popularity": 382.0, "popularityrank": 5},
        "goal": "any% glitchless no it",
        "time": 1624728151,
        "state": 3,
        "statetext": "In Progress",
        "filename": "",
        "numentrants": 2,
        "entrants": {
            "Yujito": {"displayname": "Yujito", "place": 2, "time": 6946, "message": "", "statetext": "Finished", "twitch": "yujitoo", "trueskill": "434"},
            "Sidosh": {"displayname": "Sidosh", "place": 9998, "time": -1, "message": null, "statetext": "Forfeit", "twitch": "sidosh", "trueskill": "511"}
        }
    }"#;

    #[test]
    fn parses_race_payload() {
        let race = RaceListing::from_json(RACE).unwrap();
        assert_eq!(race.id, "q7bsl");
        assert_eq!(race.game.id, 6);
        assert_eq!(race.state, RaceState::InProgress);
        assert_eq!(race.entrants["Yujito"].chat_handle, "yujitoo");
        assert_eq!(race.entrants["Yujito"].status, EntrantStatus::Finished);
        assert_eq!(race.entrants["Sidosh"].status, EntrantStatus::Forfeit);
        assert_eq!(race.entrants["Sidosh"].message, "");
    }

    #[test]
    fn summary_lists_entrants() {
        let race = RaceListing::from_json(RACE).unwrap();
        assert_eq!(
            race.summary(),
            "Pokémon Red/Blue Race - any% glitchless no it, with 2 racers: Sidosh, Yujito. Status: In Progress"
        );
    }

    #[test]
    fn unknown_status_text_is_preserved_as_unknown() {
        assert_eq!(EntrantStatus::from("Disqualified"), EntrantStatus::Unknown);
        assert_eq!(EntrantStatus::from("Forfeit"), EntrantStatus::Forfeit);
        assert!(RaceListing::from_json(r#"{"id": "x", "state": 9}"#).is_err());
    }

    #[test]
    fn finds_newest_open_race_for_waiting_user() {
        let mut old = RaceListing::with_entrants("old", [Entrant::new("Abdalain", "abdalain", EntrantStatus::Ready)]);
        old.time = 10;
        old.game.id = 6;
        let mut new = old.clone();
        new.id = "new".into();
        new.time = 20;
        let mut done = old.clone();
        done.id = "done".into();
        done.time = 30;
        done.state = RaceState::Complete;
        let mut other_game = old.clone();
        other_game.id = "other".into();
        other_game.time = 40;
        other_game.game.id = 7;

        let races = vec![old, new, done, other_game];
        assert_eq!(find_race_with_user(&races, "ABDALAIN", Some(6)).map(|r| r.id.as_str()), Some("new"));
        assert_eq!(find_race_with_user(&races, "abdalain", None).map(|r| r.id.as_str()), Some("other"));
        assert!(find_race_with_user(&races, "sidosh", None).is_none());
    }

    #[test]
    fn parses_race_list() {
        let json = format!(r#"{{"races": [{RACE}]}}"#);
        let races = RaceListing::list_from_json(&json).unwrap();
        assert_eq!(races.len(), 1);
        assert!(find_race_with_user(&races, "yujitoo", Some(6)).is_none());
    }
}
