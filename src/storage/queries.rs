//! Record reads and writes

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Params, Row, ToSql, Transaction};
use tracing::debug;

use super::analysis::derive_pitch_mix;
use super::models::*;
use super::schema::PitcherDatabase;
use crate::cli::types::{GameId, PlayerId, Season, TeamId};
use crate::error::Result;

/// Rows fetched per round trip by [`Records`].
const PAGE_SIZE: usize = 500;

const TEAM_COLUMNS: &str = "rowid, id, name, abbreviation, league, division, season";
const PITCHER_COLUMNS: &str = "rowid, id, full_name, team_id, handedness, birth_date, season";
const STAT_COLUMNS: &str = "rowid, pitcher_id, season, stat_window, era, strikeouts, \
     innings_pitched, whip, games, wins, losses, pitch_count, avg_velocity, max_velocity, \
     avg_spin_rate, pitch_mix, source";
const EVENT_COLUMNS: &str = "rowid, game_id, at_bat_number, pitch_number, pitcher_id, \
     pitch_type, release_speed, spin_rate, plate_x, plate_z, game_date, pitcher_hand, \
     batter_id, description";

const UPSERT_TEAM_SQL: &str = "
    INSERT INTO teams (id, name, abbreviation, league, division, season, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
    ON CONFLICT(id) DO UPDATE SET
        name = excluded.name,
        abbreviation = excluded.abbreviation,
        league = excluded.league,
        division = excluded.division,
        season = excluded.season,
        updated_at = excluded.updated_at
    WHERE teams.name IS NOT excluded.name
       OR teams.abbreviation IS NOT excluded.abbreviation
       OR teams.league IS NOT excluded.league
       OR teams.division IS NOT excluded.division
       OR teams.season IS NOT excluded.season";

const UPSERT_PITCHER_SQL: &str = "
    INSERT INTO pitchers (id, full_name, team_id, handedness, birth_date, season, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
    ON CONFLICT(id) DO UPDATE SET
        full_name = excluded.full_name,
        team_id = excluded.team_id,
        handedness = excluded.handedness,
        birth_date = excluded.birth_date,
        season = excluded.season,
        updated_at = excluded.updated_at
    WHERE pitchers.full_name IS NOT excluded.full_name
       OR pitchers.team_id IS NOT excluded.team_id
       OR pitchers.handedness IS NOT excluded.handedness
       OR pitchers.birth_date IS NOT excluded.birth_date
       OR pitchers.season IS NOT excluded.season";

const UPSERT_STAT_SQL: &str = "
    INSERT INTO pitching_stats
        (pitcher_id, season, stat_window, era, strikeouts, innings_pitched, whip, games,
         wins, losses, pitch_count, avg_velocity, max_velocity, avg_spin_rate, pitch_mix,
         source, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?17)
    ON CONFLICT(pitcher_id, season, stat_window) DO UPDATE SET
        era = excluded.era,
        strikeouts = excluded.strikeouts,
        innings_pitched = excluded.innings_pitched,
        whip = excluded.whip,
        games = excluded.games,
        wins = excluded.wins,
        losses = excluded.losses,
        pitch_count = excluded.pitch_count,
        avg_velocity = excluded.avg_velocity,
        max_velocity = excluded.max_velocity,
        avg_spin_rate = excluded.avg_spin_rate,
        pitch_mix = excluded.pitch_mix,
        source = excluded.source,
        updated_at = excluded.updated_at
    WHERE pitching_stats.era IS NOT excluded.era
       OR pitching_stats.strikeouts IS NOT excluded.strikeouts
       OR pitching_stats.innings_pitched IS NOT excluded.innings_pitched
       OR pitching_stats.whip IS NOT excluded.whip
       OR pitching_stats.games IS NOT excluded.games
       OR pitching_stats.wins IS NOT excluded.wins
       OR pitching_stats.losses IS NOT excluded.losses
       OR pitching_stats.pitch_count IS NOT excluded.pitch_count
       OR pitching_stats.avg_velocity IS NOT excluded.avg_velocity
       OR pitching_stats.max_velocity IS NOT excluded.max_velocity
       OR pitching_stats.avg_spin_rate IS NOT excluded.avg_spin_rate
       OR pitching_stats.pitch_mix IS NOT excluded.pitch_mix
       OR pitching_stats.source IS NOT excluded.source";

const INSERT_EVENT_SQL: &str = "
    INSERT INTO statcast_events
        (game_id, at_bat_number, pitch_number, pitcher_id, pitch_type, release_speed,
         spin_rate, plate_x, plate_z, game_date, season, pitcher_hand, batter_id,
         description, imported_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
    ON CONFLICT(game_id, at_bat_number, pitch_number) DO NOTHING";

pub(crate) fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

pub(crate) fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn read_date(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| conversion_error(idx, format!("bad date {s:?}: {e}")))
        })
        .transpose()
}

fn read_hand(row: &Row, idx: usize) -> rusqlite::Result<Option<Handedness>> {
    row.get::<_, Option<String>>(idx)?
        .map(|code| {
            Handedness::from_code(&code)
                .ok_or_else(|| conversion_error(idx, format!("bad handedness {code:?}")))
        })
        .transpose()
}

fn team_from_row(row: &Row) -> rusqlite::Result<Team> {
    Ok(Team {
        id: TeamId::new(row.get(1)?),
        name: row.get(2)?,
        abbreviation: row.get(3)?,
        league: row.get(4)?,
        division: row.get(5)?,
        season: Season::new(row.get(6)?),
    })
}

fn pitcher_from_row(row: &Row) -> rusqlite::Result<Pitcher> {
    Ok(Pitcher {
        id: PlayerId::new(row.get(1)?),
        full_name: row.get(2)?,
        team_id: TeamId::new(row.get(3)?),
        handedness: read_hand(row, 4)?.ok_or_else(|| conversion_error(4, "null handedness".into()))?,
        birth_date: read_date(row, 5)?,
        season: Season::new(row.get(6)?),
    })
}

fn stat_from_row(row: &Row) -> rusqlite::Result<PitchingStat> {
    let window: String = row.get(3)?;
    let mix: String = row.get(15)?;
    let source: String = row.get(16)?;
    Ok(PitchingStat {
        pitcher_id: PlayerId::new(row.get(1)?),
        season: Season::new(row.get(2)?),
        window: window.parse().map_err(|e| conversion_error(3, format!("{e}")))?,
        era: row.get(4)?,
        strikeouts: row.get(5)?,
        innings_pitched: row.get(6)?,
        whip: row.get(7)?,
        games: row.get(8)?,
        wins: row.get(9)?,
        losses: row.get(10)?,
        pitch_count: row.get(11)?,
        avg_velocity: row.get(12)?,
        max_velocity: row.get(13)?,
        avg_spin_rate: row.get(14)?,
        pitch_mix: serde_json::from_str::<BTreeMap<String, f64>>(&mix)
            .map_err(|e| conversion_error(15, format!("bad pitch mix: {e}")))?,
        source: source.parse().map_err(|e| conversion_error(16, format!("{e}")))?,
    })
}

fn event_from_row(row: &Row) -> rusqlite::Result<StatcastEvent> {
    Ok(StatcastEvent {
        game_id: GameId::new(row.get(1)?),
        at_bat_number: row.get(2)?,
        pitch_number: row.get(3)?,
        pitcher_id: PlayerId::new(row.get(4)?),
        pitch_type: row.get(5)?,
        release_speed: row.get(6)?,
        spin_rate: row.get(7)?,
        plate_x: row.get(8)?,
        plate_z: row.get(9)?,
        game_date: read_date(row, 10)?,
        pitcher_hand: read_hand(row, 11)?,
        batter_id: row.get::<_, Option<u64>>(12)?.map(PlayerId::new),
        description: row.get(13)?,
    })
}

fn record_from_row(kind: EntityKind, row: &Row) -> rusqlite::Result<Record> {
    Ok(match kind {
        EntityKind::Team => Record::Team(team_from_row(row)?),
        EntityKind::Pitcher => Record::Pitcher(pitcher_from_row(row)?),
        EntityKind::PitchingStat => Record::PitchingStat(stat_from_row(row)?),
        EntityKind::StatcastEvent => Record::StatcastEvent(event_from_row(row)?),
    })
}

fn columns(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Team => TEAM_COLUMNS,
        EntityKind::Pitcher => PITCHER_COLUMNS,
        EntityKind::PitchingStat => STAT_COLUMNS,
        EntityKind::StatcastEvent => EVENT_COLUMNS,
    }
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// SQL conditions for the filter fields that apply to `kind`.
fn filter_clauses(kind: EntityKind, filter: &RecordFilter) -> Vec<(&'static str, Box<dyn ToSql>)> {
    let mut clauses: Vec<(&'static str, Box<dyn ToSql>)> = Vec::new();

    if let Some(season) = filter.season {
        clauses.push(("season = ?", Box::new(season.as_u16())));
    }

    match kind {
        EntityKind::Team => {
            if let Some(team_id) = filter.team_id {
                clauses.push(("id = ?", Box::new(team_id.as_u32())));
            }
            if let Some(name) = &filter.name_contains {
                clauses.push(("name LIKE ? ESCAPE '\\'", Box::new(like_pattern(name))));
            }
        }
        EntityKind::Pitcher => {
            if let Some(team_id) = filter.team_id {
                clauses.push(("team_id = ?", Box::new(team_id.as_u32())));
            }
            if let Some(pitcher_id) = filter.pitcher_id {
                clauses.push(("id = ?", Box::new(pitcher_id.as_u64())));
            }
            if let Some(name) = &filter.name_contains {
                clauses.push(("full_name LIKE ? ESCAPE '\\'", Box::new(like_pattern(name))));
            }
        }
        EntityKind::PitchingStat => {
            if let Some(pitcher_id) = filter.pitcher_id {
                clauses.push(("pitcher_id = ?", Box::new(pitcher_id.as_u64())));
            }
        }
        EntityKind::StatcastEvent => {
            if let Some(pitcher_id) = filter.pitcher_id {
                clauses.push(("pitcher_id = ?", Box::new(pitcher_id.as_u64())));
            }
            if let Some(since) = filter.since {
                clauses.push(("game_date >= ?", Box::new(since.format("%Y-%m-%d").to_string())));
            }
        }
    }

    clauses
}

fn row_exists<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<bool> {
    Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

fn outcome(existed: bool, changed: usize) -> UpsertOutcome {
    match (existed, changed) {
        (false, _) => UpsertOutcome::Inserted,
        (true, 0) => UpsertOutcome::Unchanged,
        (true, _) => UpsertOutcome::Updated,
    }
}

fn upsert_team(conn: &Connection, team: &Team, now: i64) -> Result<UpsertOutcome> {
    let existed = row_exists(conn, "SELECT 1 FROM teams WHERE id = ?1", [team.id.as_u32()])?;
    let changed = conn.prepare_cached(UPSERT_TEAM_SQL)?.execute(params![
        team.id.as_u32(),
        team.name,
        team.abbreviation,
        team.league,
        team.division,
        team.season.as_u16(),
        now
    ])?;
    Ok(outcome(existed, changed))
}

fn upsert_pitcher(conn: &Connection, pitcher: &Pitcher, now: i64) -> Result<UpsertOutcome> {
    let existed = row_exists(
        conn,
        "SELECT 1 FROM pitchers WHERE id = ?1",
        [pitcher.id.as_u64()],
    )?;
    let changed = conn.prepare_cached(UPSERT_PITCHER_SQL)?.execute(params![
        pitcher.id.as_u64(),
        pitcher.full_name,
        pitcher.team_id.as_u32(),
        pitcher.handedness.code(),
        format_date(pitcher.birth_date),
        pitcher.season.as_u16(),
        now
    ])?;
    Ok(outcome(existed, changed))
}

pub(crate) fn upsert_stat(conn: &Connection, stat: &PitchingStat, now: i64) -> Result<UpsertOutcome> {
    let window = stat.window.to_string();
    let existed = row_exists(
        conn,
        "SELECT 1 FROM pitching_stats WHERE pitcher_id = ?1 AND season = ?2 AND stat_window = ?3",
        params![stat.pitcher_id.as_u64(), stat.season.as_u16(), window],
    )?;
    let mix = serde_json::to_string(&stat.pitch_mix)?;
    let changed = conn.prepare_cached(UPSERT_STAT_SQL)?.execute(params![
        stat.pitcher_id.as_u64(),
        stat.season.as_u16(),
        window,
        stat.era,
        stat.strikeouts,
        stat.innings_pitched,
        stat.whip,
        stat.games,
        stat.wins,
        stat.losses,
        stat.pitch_count,
        stat.avg_velocity,
        stat.max_velocity,
        stat.avg_spin_rate,
        mix,
        stat.source.as_str(),
        now
    ])?;
    Ok(outcome(existed, changed))
}

/// Insert one event; `false` when an event with the same key already exists.
fn insert_event(conn: &Connection, event: &StatcastEvent, now: i64) -> Result<bool> {
    use chrono::Datelike;

    let season = event.game_date.map(|d| d.year());
    let changed = conn.prepare_cached(INSERT_EVENT_SQL)?.execute(params![
        event.game_id.as_u64(),
        event.at_bat_number,
        event.pitch_number,
        event.pitcher_id.as_u64(),
        event.pitch_type,
        event.release_speed,
        event.spin_rate,
        event.plate_x,
        event.plate_z,
        format_date(event.game_date),
        season,
        event.pitcher_hand.map(Handedness::code),
        event.batter_id.map(|b| b.as_u64()),
        event.description,
        now
    ])?;
    Ok(changed > 0)
}

fn upsert_in(conn: &Connection, record: &Record, now: i64) -> Result<UpsertOutcome> {
    match record {
        Record::Team(team) => upsert_team(conn, team, now),
        Record::Pitcher(pitcher) => upsert_pitcher(conn, pitcher, now),
        Record::PitchingStat(stat) => upsert_stat(conn, stat, now),
        // Events are append-only: the first copy of a key wins.
        Record::StatcastEvent(event) => Ok(if insert_event(conn, event, now)? {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Unchanged
        }),
    }
}

impl PitcherDatabase {
    /// Insert or update a single record by its natural key.
    pub fn upsert(&mut self, record: &Record) -> Result<UpsertOutcome> {
        let tx = self.conn.transaction()?;
        let outcome = upsert_in(&tx, record, now_timestamp())?;
        tx.commit()?;
        Ok(outcome)
    }

    /// Upsert many records in one transaction; nothing is written if any fails.
    pub fn upsert_batch<'r, I>(&mut self, records: I) -> Result<UpsertSummary>
    where
        I: IntoIterator<Item = &'r Record>,
    {
        let now = now_timestamp();
        let tx = self.conn.transaction()?;
        let mut summary = UpsertSummary::default();
        for record in records {
            summary.record(upsert_in(&tx, record, now)?);
        }
        tx.commit()?;
        debug!(?summary, "upserted batch");
        Ok(summary)
    }

    /// Append events, skipping any whose key is already stored.
    pub fn bulk_insert_ignore_duplicates(&mut self, events: &[StatcastEvent]) -> Result<BulkInsertReport> {
        let mut writer = self.statcast_writer()?;
        writer.insert(events)?;
        writer.commit()
    }

    /// Start a transactional writer for a multi-chunk event import.
    pub fn statcast_writer(&mut self) -> Result<StatcastWriter<'_>> {
        Ok(StatcastWriter {
            tx: self.conn.transaction()?,
            imported_at: now_timestamp(),
            report: BulkInsertReport::default(),
            pitchers: BTreeSet::new(),
        })
    }

    /// Lazily iterate the stored records of `kind` matching `filter`.
    pub fn query(&self, kind: EntityKind, filter: RecordFilter) -> Records<'_> {
        Records {
            conn: &self.conn,
            kind,
            filter,
            after_rowid: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn get_team(&self, team_id: TeamId) -> Result<Option<Team>> {
        let sql = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [team_id.as_u32()], team_from_row)
            .optional()?)
    }

    pub fn team_exists(&self, team_id: TeamId) -> Result<bool> {
        row_exists(&self.conn, "SELECT 1 FROM teams WHERE id = ?1", [team_id.as_u32()])
    }

    pub fn get_pitcher(&self, pitcher_id: PlayerId) -> Result<Option<Pitcher>> {
        let sql = format!("SELECT {PITCHER_COLUMNS} FROM pitchers WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, [pitcher_id.as_u64()], pitcher_from_row)
            .optional()?)
    }

    pub fn get_pitching_stat(
        &self,
        pitcher_id: PlayerId,
        season: Season,
        window: StatWindow,
    ) -> Result<Option<PitchingStat>> {
        let sql = format!(
            "SELECT {STAT_COLUMNS} FROM pitching_stats
             WHERE pitcher_id = ?1 AND season = ?2 AND stat_window = ?3"
        );
        Ok(self
            .conn
            .query_row(
                &sql,
                params![pitcher_id.as_u64(), season.as_u16(), window.to_string()],
                stat_from_row,
            )
            .optional()?)
    }

    /// Pitchers whose name contains `name` (case-insensitive), sorted by name.
    pub fn search_pitchers(&self, name: &str) -> Result<Vec<Pitcher>> {
        let filter = RecordFilter {
            name_contains: Some(name.trim().to_string()),
            ..RecordFilter::default()
        };
        let mut pitchers = Vec::new();
        for record in self.query(EntityKind::Pitcher, filter) {
            if let Record::Pitcher(pitcher) = record? {
                pitchers.push(pitcher);
            }
        }
        pitchers.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.id.cmp(&b.id)));
        Ok(pitchers)
    }

    /// All stat lines stored for one pitcher in a season.
    pub fn pitching_stats_for(&self, pitcher_id: PlayerId, season: Season) -> Result<Vec<PitchingStat>> {
        let filter = RecordFilter {
            season: Some(season),
            pitcher_id: Some(pitcher_id),
            ..RecordFilter::default()
        };
        let mut stats = Vec::new();
        for record in self.query(EntityKind::PitchingStat, filter) {
            if let Record::PitchingStat(stat) = record? {
                stats.push(stat);
            }
        }
        Ok(stats)
    }

    pub fn count(&self, kind: EntityKind) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }
}

/// Writes Statcast events for one import inside a single transaction.
///
/// Dropping the writer without [`commit`](Self::commit) rolls every chunk
/// back.
pub struct StatcastWriter<'db> {
    tx: Transaction<'db>,
    imported_at: i64,
    report: BulkInsertReport,
    pitchers: BTreeSet<PlayerId>,
}

impl StatcastWriter<'_> {
    pub fn insert(&mut self, events: &[StatcastEvent]) -> Result<BulkInsertReport> {
        let mut batch = BulkInsertReport::default();
        for event in events {
            if insert_event(&self.tx, event, self.imported_at)? {
                batch.inserted += 1;
            } else {
                batch.duplicates += 1;
            }
            self.pitchers.insert(event.pitcher_id);
        }
        self.report.merge(batch);
        Ok(batch)
    }

    /// Totals so far.
    pub fn report(&self) -> BulkInsertReport {
        self.report
    }

    /// Recompute pitch-mix stat lines for every pitcher seen by this writer.
    pub fn derive_pitch_mix(&mut self) -> Result<UpsertSummary> {
        let pitcher_ids: Vec<PlayerId> = self.pitchers.iter().copied().collect();
        let now = now_timestamp();
        let mut summary = UpsertSummary::default();
        for stat in derive_pitch_mix(&self.tx, &pitcher_ids)? {
            summary.record(upsert_stat(&self.tx, &stat, now)?);
        }
        Ok(summary)
    }

    pub fn commit(self) -> Result<BulkInsertReport> {
        self.tx.commit()?;
        Ok(self.report)
    }
}

/// Lazy, finite cursor over stored records.
///
/// Rows are fetched a page at a time in insertion order; iteration ends when
/// a page comes back short. [`rewind`](Self::rewind) starts over from the
/// first row.
pub struct Records<'db> {
    conn: &'db Connection,
    kind: EntityKind,
    filter: RecordFilter,
    after_rowid: i64,
    buffer: VecDeque<Record>,
    exhausted: bool,
}

impl Records<'_> {
    pub fn rewind(&mut self) {
        self.after_rowid = 0;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fetch_page(&mut self) -> Result<()> {
        let kind = self.kind;
        let mut sql = format!(
            "SELECT {} FROM {} WHERE rowid > ?",
            columns(kind),
            kind.table()
        );
        let mut values: Vec<Box<dyn ToSql>> = vec![Box::new(self.after_rowid)];
        for (clause, value) in filter_clauses(kind, &self.filter) {
            sql.push_str(" AND ");
            sql.push_str(clause);
            values.push(value);
        }
        sql.push_str(" ORDER BY rowid LIMIT ?");
        values.push(Box::new(PAGE_SIZE as i64));

        let refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(refs.as_slice(), |row| {
                Ok((row.get::<_, i64>(0)?, record_from_row(kind, row)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if rows.len() < PAGE_SIZE {
            self.exhausted = true;
        }
        for (rowid, record) in rows {
            self.after_rowid = rowid;
            self.buffer.push_back(record);
        }
        Ok(())
    }
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
