//! Collection operations: client calls, parsing and storage writes composed
//! into one transaction per operation.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::types::{Days, PlayerId, Season, TeamId};
use crate::error::{ParseError, PitcherError, Result};
use crate::mlb::parse::{parse_pitcher, parse_stat_line, parse_team, stat_line};
use crate::mlb::{MlbClient, StatcastColumns};
use crate::storage::{
    PitcherDatabase, PitchingStat, Record, StatWindow, SyncCounts, SyncOperation, Team, UpsertOutcome,
    UpsertSummary,
};

#[cfg(test)]
mod tests;

/// Rows handed to rayon per parse batch.
const CHUNK_ROWS: usize = 2048;

/// A stored stat line and what the upsert did with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatOutcome {
    pub stat: PitchingStat,
    pub outcome: UpsertOutcome,
}

/// Result of a `collect_recent` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecentReport {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    /// Pitchers the API reported as active in the window.
    pub active: usize,
    /// Active pitchers without a stat line for the season.
    pub without_stats: usize,
    pub summary: UpsertSummary,
    pub stats: Vec<PitchingStat>,
}

/// Result of a Statcast CSV import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Data rows read from the file.
    pub rows: u64,
    pub inserted: usize,
    pub duplicates: usize,
    /// Pitch-mix stat lines written (only with `process`).
    pub pitch_mix_rows: usize,
}

pub struct Collector<'a> {
    client: &'a MlbClient,
    db: &'a mut PitcherDatabase,
}

impl<'a> Collector<'a> {
    pub fn new(client: &'a MlbClient, db: &'a mut PitcherDatabase) -> Self {
        Self { client, db }
    }

    /// Fetch and upsert every team of a season.
    pub async fn collect_teams(&mut self, season: Season) -> Result<UpsertSummary> {
        let started_at = Utc::now();
        let result = self.store_teams(season).await;
        self.log_sync(SyncOperation::Teams, &format!("season={season}"), started_at, &result, |s| {
            SyncCounts::from(*s)
        });
        result
    }

    async fn store_teams(&mut self, season: Season) -> Result<UpsertSummary> {
        let raw = self.client.get_teams(season).await?;
        let records = raw
            .iter()
            .map(|team| parse_team(team, season).map(Record::from))
            .collect::<std::result::Result<Vec<_>, ParseError>>()?;

        let summary = self.db.upsert_batch(&records)?;
        info!(%season, ?summary, "collected teams");
        Ok(summary)
    }

    /// Fetch and upsert every pitcher of a season.
    ///
    /// Teams referenced by a pitcher but not yet stored are fetched one at a
    /// time and written in the same transaction as the pitchers; a team the
    /// API cannot supply fails the whole run before anything is written.
    pub async fn collect_pitchers(&mut self, season: Season) -> Result<UpsertSummary> {
        let started_at = Utc::now();
        let result = self.store_pitchers(season).await;
        self.log_sync(SyncOperation::Pitchers, &format!("season={season}"), started_at, &result, |s| {
            SyncCounts::from(*s)
        });
        result
    }

    async fn store_pitchers(&mut self, season: Season) -> Result<UpsertSummary> {
        let raw = self.client.get_pitchers(season).await?;
        let pitchers = raw
            .iter()
            .map(|pitcher| parse_pitcher(pitcher, season))
            .collect::<std::result::Result<Vec<_>, ParseError>>()?;

        let mut records = Vec::with_capacity(pitchers.len());
        let team_ids: BTreeSet<TeamId> = pitchers.iter().map(|p| p.team_id).collect();
        for team_id in team_ids {
            if !self.db.team_exists(team_id)? {
                records.push(Record::from(self.resolve_team(team_id, season).await?));
            }
        }
        let resolved_teams = records.len();

        records.extend(pitchers.into_iter().map(Record::from));
        let mut summary = self.db.upsert_batch(&records)?;
        // Resolved teams are new rows; report pitchers only.
        summary.inserted = summary.inserted.saturating_sub(resolved_teams);
        info!(%season, ?summary, resolved_teams, "collected pitchers");
        Ok(summary)
    }

    async fn resolve_team(&self, team_id: TeamId, season: Season) -> Result<Team> {
        let unresolved = |reason: String| PitcherError::Dependency {
            message: format!("team {team_id} is not stored and could not be fetched: {reason}"),
        };

        warn!(%team_id, "pitcher references unknown team, fetching it");
        let raw = match self.client.get_team(team_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Err(unresolved("the API returned no team".to_string())),
            Err(PitcherError::Api { status, body }) if (400..500).contains(&status) => {
                return Err(unresolved(format!("HTTP {status}: {body}")));
            }
            Err(PitcherError::Json(e)) => return Err(unresolved(e.to_string())),
            Err(e) => return Err(e),
        };

        parse_team(&raw, season).map_err(|e| unresolved(e.to_string()))
    }

    /// Fetch and upsert one pitcher's season line.
    ///
    /// Returns `None` when the API has no stats for that pitcher and season.
    pub async fn collect_stats(&mut self, pitcher_id: PlayerId, season: Season) -> Result<Option<StatOutcome>> {
        let started_at = Utc::now();
        let result = self.store_stats(pitcher_id, season).await;
        let scope = format!("pitcher={pitcher_id} season={season}");
        self.log_sync(SyncOperation::Stats, &scope, started_at, &result, |outcome| {
            let mut summary = UpsertSummary::default();
            if let Some(outcome) = outcome {
                summary.record(outcome.outcome);
            }
            SyncCounts::from(summary)
        });
        result
    }

    async fn store_stats(&mut self, pitcher_id: PlayerId, season: Season) -> Result<Option<StatOutcome>> {
        let Some(stat) = self.fetch_stat(pitcher_id, season, StatWindow::Season).await? else {
            info!(%pitcher_id, %season, "no stats reported");
            return Ok(None);
        };
        let outcome = self.db.upsert(&stat.clone().into())?;
        info!(%pitcher_id, %season, ?outcome, "collected stats");
        Ok(Some(StatOutcome { stat, outcome }))
    }

    /// Collect stats only for pitchers active during the last `days` days.
    ///
    /// The window is inclusive and ends on `today`, so it spans `[today -
    /// (days - 1), today]`. Lines are stored with window `asof:<today>` in one
    /// transaction.
    pub async fn collect_recent(&mut self, days: Days, season: Season, today: NaiveDate) -> Result<RecentReport> {
        let started_at = Utc::now();
        let result = self.store_recent(days, season, today).await;
        let scope = format!("days={days} season={season} end={today}");
        self.log_sync(SyncOperation::Recent, &scope, started_at, &result, |r| SyncCounts::from(r.summary));
        result
    }

    async fn store_recent(&mut self, days: Days, season: Season, today: NaiveDate) -> Result<RecentReport> {
        let start = recent_window_start(days, today);
        let active = self.client.get_active_pitcher_ids(start, today, season).await?;

        let mut report = RecentReport {
            start: Some(start),
            end: Some(today),
            active: active.len(),
            ..RecentReport::default()
        };
        for pitcher_id in active {
            match self.fetch_stat(pitcher_id, season, StatWindow::AsOf(today)).await? {
                Some(stat) => report.stats.push(stat),
                None => report.without_stats += 1,
            }
        }

        let records: Vec<Record> = report.stats.iter().cloned().map(Record::from).collect();
        report.summary = self.db.upsert_batch(&records)?;
        info!(%start, end = %today, active = report.active, summary = ?report.summary, "collected recent stats");
        Ok(report)
    }

    async fn fetch_stat(&self, pitcher_id: PlayerId, season: Season, window: StatWindow) -> Result<Option<PitchingStat>> {
        let payload = self.client.get_player_stats(pitcher_id, season).await?;
        match stat_line(&payload)? {
            Some(stat) => Ok(Some(parse_stat_line(stat, pitcher_id, season, window)?)),
            None => Ok(None),
        }
    }

    /// Stream a Statcast CSV into storage.
    ///
    /// Rows are parsed in parallel chunks and written through one
    /// `StatcastWriter`, so the whole file commits or nothing does.
    pub fn import_statcast_csv(&mut self, path: &Path, process: bool) -> Result<ImportReport> {
        let started_at = Utc::now();
        let result = self.store_statcast_csv(path, process);
        let scope = format!("path={}", path.display());
        self.log_sync(SyncOperation::StatcastImport, &scope, started_at, &result, |r| SyncCounts {
            inserted: r.inserted,
            duplicates: r.duplicates,
            ..SyncCounts::default()
        });
        result
    }

    fn store_statcast_csv(&mut self, path: &Path, process: bool) -> Result<ImportReport> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| csv_error(e, 0))?;
        let headers = reader.headers().map_err(|e| csv_error(e, 0))?.clone();
        let columns = StatcastColumns::from_headers(&headers)?;

        let mut writer = self.db.statcast_writer()?;
        let mut chunk = Vec::with_capacity(CHUNK_ROWS);
        let mut rows = 0u64;

        for result in reader.records() {
            rows += 1;
            chunk.push((rows, result.map_err(|e| csv_error(e, rows))?));
            if chunk.len() == CHUNK_ROWS {
                let batch = writer.insert(&columns.parse_rows(&chunk)?)?;
                debug!(rows, inserted = batch.inserted, duplicates = batch.duplicates, "wrote chunk");
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            writer.insert(&columns.parse_rows(&chunk)?)?;
        }

        let pitch_mix_rows = if process {
            writer.derive_pitch_mix()?.total()
        } else {
            0
        };
        let totals = writer.commit()?;

        let report = ImportReport {
            rows,
            inserted: totals.inserted,
            duplicates: totals.duplicates,
            pitch_mix_rows,
        };
        info!(path = %path.display(), ?report, "imported statcast file");
        Ok(report)
    }

    /// Record a finished operation in the sync log. A failure to write the
    /// log is reported but never replaces the operation's own result.
    fn log_sync<T>(
        &mut self,
        operation: SyncOperation,
        scope: &str,
        started_at: DateTime<Utc>,
        result: &Result<T>,
        counts: impl FnOnce(&T) -> SyncCounts,
    ) {
        let outcome = match result {
            Ok(value) => Ok(counts(value)),
            Err(e) => Err(format!("{}: {e}", e.kind())),
        };
        if let Err(e) = self.db.record_sync(operation, scope, started_at, outcome) {
            warn!(%operation, error = %e, "could not write sync log");
        }
    }
}

/// First day of an inclusive window of `days` days ending on `today`.
fn recent_window_start(days: Days, today: NaiveDate) -> NaiveDate {
    today - ChronoDuration::days(i64::from(days.as_u32().saturating_sub(1)))
}

fn csv_error(err: csv::Error, row: u64) -> PitcherError {
    if err.is_io_error() {
        return PitcherError::Io(err.into());
    }
    let parse = ParseError::malformed("csv", err.to_string());
    if row > 0 {
        parse.at_row(row).into()
    } else {
        parse.into()
    }
}
