//! Response envelopes of the MLB Stats API.
//!
//! Only the outer shapes are typed here. Individual records stay as raw
//! `Value`s so the parsers can name the exact field that is missing or
//! malformed.

use serde::Deserialize;
use serde_json::Value;

/// `GET /teams` and `GET /teams/{id}`
#[derive(Debug, Deserialize)]
pub struct TeamsEnvelope {
    #[serde(default)]
    pub teams: Vec<Value>,
}

/// `GET /sports/1/players`
#[derive(Debug, Deserialize)]
pub struct PeopleEnvelope {
    #[serde(default)]
    pub people: Vec<Value>,
}

/// `GET /people/{id}/stats` and `GET /stats`
#[derive(Debug, Deserialize)]
pub struct StatsEnvelope {
    pub stats: Vec<StatGroup>,
}

#[derive(Debug, Deserialize)]
pub struct StatGroup {
    #[serde(default)]
    pub splits: Vec<StatSplit>,
}

#[derive(Debug, Deserialize)]
pub struct StatSplit {
    #[serde(default)]
    pub player: Option<PersonRef>,
    #[serde(default)]
    pub stat: Value,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PersonRef {
    pub id: u64,
}

impl StatsEnvelope {
    /// Distinct player ids across all splits, in first-seen order.
    pub fn player_ids(&self) -> Vec<u64> {
        let mut ids = Vec::new();
        for split in self.stats.iter().flat_map(|group| &group.splits) {
            if let Some(player) = split.player {
                if !ids.contains(&player.id) {
                    ids.push(player.id);
                }
            }
        }
        ids
    }
}
