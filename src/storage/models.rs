//! Data models for the storage layer

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::cli::types::{GameId, PlayerId, Season, TeamId};
use crate::error::{PitcherError, Result};

/// Club information stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub abbreviation: String,
    pub league: String,
    pub division: String,
    /// Season this row was last fetched for.
    pub season: Season,
}

/// Throwing hand. `S` covers the rare switch pitcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
    Switch,
}

impl Handedness {
    pub fn code(self) -> &'static str {
        match self {
            Handedness::Left => "L",
            Handedness::Right => "R",
            Handedness::Switch => "S",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_uppercase().as_str() {
            "L" => Some(Handedness::Left),
            "R" => Some(Handedness::Right),
            "S" => Some(Handedness::Switch),
            _ => None,
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Pitcher information stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pitcher {
    pub id: PlayerId,
    pub full_name: String,
    pub team_id: TeamId,
    pub handedness: Handedness,
    pub birth_date: Option<NaiveDate>,
    /// Season this pitcher was last seen on a roster.
    pub season: Season,
}

/// Aggregation window of a stat line; part of its natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatWindow {
    /// Full-season aggregate as reported by the API.
    Season,
    /// Snapshot as of a given date.
    AsOf(NaiveDate),
    /// Pitch mix derived from imported Statcast events.
    PitchMix,
}

impl fmt::Display for StatWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatWindow::Season => write!(f, "season"),
            StatWindow::AsOf(date) => write!(f, "asof:{}", date.format("%Y-%m-%d")),
            StatWindow::PitchMix => write!(f, "pitch-mix"),
        }
    }
}

impl FromStr for StatWindow {
    type Err = PitcherError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "season" => Ok(StatWindow::Season),
            "pitch-mix" => Ok(StatWindow::PitchMix),
            other => other
                .strip_prefix("asof:")
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .map(StatWindow::AsOf)
                .ok_or_else(|| PitcherError::schema(format!("unknown stat window {other:?}"))),
        }
    }
}

/// Where a stat line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatSource {
    MlbApi,
    Statcast,
}

impl StatSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StatSource::MlbApi => "mlb_api",
            StatSource::Statcast => "statcast",
        }
    }
}

impl FromStr for StatSource {
    type Err = PitcherError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mlb_api" => Ok(StatSource::MlbApi),
            "statcast" => Ok(StatSource::Statcast),
            other => Err(PitcherError::schema(format!("unknown stat source {other:?}"))),
        }
    }
}

/// Pitching numbers for one pitcher, season and window.
///
/// Every numeric field is optional: `None` means the source did not report a
/// usable value and is stored as NULL, never as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchingStat {
    pub pitcher_id: PlayerId,
    pub season: Season,
    pub window: StatWindow,
    pub era: Option<f64>,
    pub strikeouts: Option<u32>,
    pub innings_pitched: Option<f64>,
    pub whip: Option<f64>,
    pub games: Option<u32>,
    pub wins: Option<u32>,
    pub losses: Option<u32>,
    pub pitch_count: Option<u32>,
    pub avg_velocity: Option<f64>,
    pub max_velocity: Option<f64>,
    pub avg_spin_rate: Option<f64>,
    /// Pitch type code -> share of pitches (0.0..=1.0).
    pub pitch_mix: BTreeMap<String, f64>,
    pub source: StatSource,
}

impl PitchingStat {
    /// An empty stat line for the given key.
    pub fn empty(pitcher_id: PlayerId, season: Season, window: StatWindow, source: StatSource) -> Self {
        Self {
            pitcher_id,
            season,
            window,
            era: None,
            strikeouts: None,
            innings_pitched: None,
            whip: None,
            games: None,
            wins: None,
            losses: None,
            pitch_count: None,
            avg_velocity: None,
            max_velocity: None,
            avg_spin_rate: None,
            pitch_mix: BTreeMap::new(),
            source,
        }
    }
}

/// One tracked pitch from a Statcast export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatcastEvent {
    pub game_id: GameId,
    pub at_bat_number: u32,
    pub pitch_number: u32,
    pub pitcher_id: PlayerId,
    pub pitch_type: String,
    pub release_speed: Option<f64>,
    pub spin_rate: Option<f64>,
    pub plate_x: Option<f64>,
    pub plate_z: Option<f64>,
    pub game_date: Option<NaiveDate>,
    pub pitcher_hand: Option<Handedness>,
    pub batter_id: Option<PlayerId>,
    pub description: Option<String>,
}

/// Aggregated usage of one pitch type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchMixEntry {
    pub pitch_type: String,
    pub count: u32,
    pub share: f64,
    pub avg_velocity: Option<f64>,
    pub max_velocity: Option<f64>,
    pub avg_spin_rate: Option<f64>,
}

/// The entity kinds the storage layer manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Team,
    Pitcher,
    PitchingStat,
    StatcastEvent,
}

impl EntityKind {
    pub(crate) fn table(self) -> &'static str {
        match self {
            EntityKind::Team => "teams",
            EntityKind::Pitcher => "pitchers",
            EntityKind::PitchingStat => "pitching_stats",
            EntityKind::StatcastEvent => "statcast_events",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// A normalized record of any kind
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Team(Team),
    Pitcher(Pitcher),
    PitchingStat(PitchingStat),
    StatcastEvent(StatcastEvent),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Team(_) => EntityKind::Team,
            Record::Pitcher(_) => EntityKind::Pitcher,
            Record::PitchingStat(_) => EntityKind::PitchingStat,
            Record::StatcastEvent(_) => EntityKind::StatcastEvent,
        }
    }
}

impl From<Team> for Record {
    fn from(team: Team) -> Self {
        Record::Team(team)
    }
}

impl From<Pitcher> for Record {
    fn from(pitcher: Pitcher) -> Self {
        Record::Pitcher(pitcher)
    }
}

impl From<PitchingStat> for Record {
    fn from(stat: PitchingStat) -> Self {
        Record::PitchingStat(stat)
    }
}

impl From<StatcastEvent> for Record {
    fn from(event: StatcastEvent) -> Self {
        Record::StatcastEvent(event)
    }
}

/// Filter for [`PitcherDatabase::query`](super::PitcherDatabase::query).
///
/// Fields that do not apply to the queried kind are ignored.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub season: Option<Season>,
    pub team_id: Option<TeamId>,
    pub pitcher_id: Option<PlayerId>,
    /// Case-insensitive substring of a team or pitcher name.
    pub name_contains: Option<String>,
    /// Statcast events on or after this date.
    pub since: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn season(season: Season) -> Self {
        Self {
            season: Some(season),
            ..Self::default()
        }
    }

    pub fn pitcher(pitcher_id: PlayerId) -> Self {
        Self {
            pitcher_id: Some(pitcher_id),
            ..Self::default()
        }
    }
}

/// Result of a single upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// The stored row already held identical values.
    Unchanged,
}

/// Counts for a batch of upserts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl UpsertSummary {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }
}

/// Counts for an append-only bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkInsertReport {
    pub inserted: usize,
    pub duplicates: usize,
}

impl BulkInsertReport {
    pub fn merge(&mut self, other: BulkInsertReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
    }
}

impl From<UpsertSummary> for SyncCounts {
    fn from(summary: UpsertSummary) -> Self {
        Self {
            inserted: summary.inserted,
            updated: summary.updated,
            unchanged: summary.unchanged,
            duplicates: 0,
        }
    }
}

/// A collection operation tracked in the sync log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Teams,
    Pitchers,
    Stats,
    Recent,
    StatcastImport,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperation::Teams => "teams",
            SyncOperation::Pitchers => "pitchers",
            SyncOperation::Stats => "stats",
            SyncOperation::Recent => "recent",
            SyncOperation::StatcastImport => "statcast_import",
        }
    }
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperation {
    type Err = PitcherError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "teams" => Ok(SyncOperation::Teams),
            "pitchers" => Ok(SyncOperation::Pitchers),
            "stats" => Ok(SyncOperation::Stats),
            "recent" => Ok(SyncOperation::Recent),
            "statcast_import" => Ok(SyncOperation::StatcastImport),
            other => Err(PitcherError::Config {
                key: "operation".to_string(),
                message: format!("unknown sync operation {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
}

impl SyncStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = PitcherError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(SyncStatus::Success),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(PitcherError::schema(format!("unknown sync status {other:?}"))),
        }
    }
}

/// Row counts written by one collection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub duplicates: usize,
}

/// One entry of the sync history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub id: i64,
    pub operation: SyncOperation,
    /// What the run covered, e.g. `season=2024`.
    pub scope: String,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: SyncCounts,
    pub error: Option<String>,
}
