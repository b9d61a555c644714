//! Database schema and connection management

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use crate::error::{PitcherError, Result};

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 2;

/// Forward-only migrations; entry `n` upgrades version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[MIGRATION_V1, MIGRATION_V2];

const MIGRATION_V1: &str = "
    CREATE TABLE IF NOT EXISTS teams (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        abbreviation TEXT NOT NULL,
        league TEXT NOT NULL,
        division TEXT NOT NULL,
        season INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS pitchers (
        id INTEGER PRIMARY KEY,
        full_name TEXT NOT NULL,
        team_id INTEGER NOT NULL REFERENCES teams(id),
        handedness TEXT NOT NULL,
        birth_date TEXT,
        season INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS pitching_stats (
        pitcher_id INTEGER NOT NULL,
        season INTEGER NOT NULL,
        stat_window TEXT NOT NULL,
        era REAL,
        strikeouts INTEGER,
        innings_pitched REAL,
        whip REAL,
        games INTEGER,
        wins INTEGER,
        losses INTEGER,
        pitch_count INTEGER,
        avg_velocity REAL,
        max_velocity REAL,
        avg_spin_rate REAL,
        pitch_mix TEXT NOT NULL DEFAULT '{}',
        source TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (pitcher_id, season, stat_window)
    );

    CREATE TABLE IF NOT EXISTS statcast_events (
        game_id INTEGER NOT NULL,
        at_bat_number INTEGER NOT NULL,
        pitch_number INTEGER NOT NULL,
        pitcher_id INTEGER NOT NULL,
        pitch_type TEXT NOT NULL,
        release_speed REAL,
        spin_rate REAL,
        plate_x REAL,
        plate_z REAL,
        game_date TEXT,
        season INTEGER,
        pitcher_hand TEXT,
        batter_id INTEGER,
        description TEXT,
        imported_at INTEGER NOT NULL,
        PRIMARY KEY (game_id, at_bat_number, pitch_number)
    );

    CREATE INDEX IF NOT EXISTS idx_pitchers_team ON pitchers(team_id);
    CREATE INDEX IF NOT EXISTS idx_pitchers_name ON pitchers(full_name);
    CREATE INDEX IF NOT EXISTS idx_stats_season ON pitching_stats(season);
    CREATE INDEX IF NOT EXISTS idx_events_pitcher_season ON statcast_events(pitcher_id, season);
    CREATE INDEX IF NOT EXISTS idx_events_date ON statcast_events(game_date);
";

const MIGRATION_V2: &str = "
    CREATE TABLE IF NOT EXISTS sync_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        operation TEXT NOT NULL,
        scope TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        finished_at INTEGER NOT NULL,
        inserted INTEGER NOT NULL DEFAULT 0,
        updated INTEGER NOT NULL DEFAULT 0,
        unchanged INTEGER NOT NULL DEFAULT 0,
        duplicates INTEGER NOT NULL DEFAULT 0,
        error TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_sync_log_operation ON sync_log(operation, status, id);
";

/// Columns each table must have for this build to read and write it.
const EXPECTED_COLUMNS: &[(&str, &[&str])] = &[
    (
        "teams",
        &["id", "name", "abbreviation", "league", "division", "season", "created_at", "updated_at"],
    ),
    (
        "pitchers",
        &["id", "full_name", "team_id", "handedness", "birth_date", "season", "created_at", "updated_at"],
    ),
    (
        "pitching_stats",
        &[
            "pitcher_id", "season", "stat_window", "era", "strikeouts", "innings_pitched", "whip",
            "games", "wins", "losses", "pitch_count", "avg_velocity", "max_velocity",
            "avg_spin_rate", "pitch_mix", "source", "created_at", "updated_at",
        ],
    ),
    (
        "statcast_events",
        &[
            "game_id", "at_bat_number", "pitch_number", "pitcher_id", "pitch_type",
            "release_speed", "spin_rate", "plate_x", "plate_z", "game_date", "season",
            "pitcher_hand", "batter_id", "description", "imported_at",
        ],
    ),
    (
        "sync_log",
        &[
            "id", "operation", "scope", "status", "started_at", "finished_at", "inserted",
            "updated", "unchanged", "duplicates", "error",
        ],
    ),
];

/// Connection manager for the pitcher database
pub struct PitcherDatabase {
    pub(crate) conn: Connection,
    path: Option<PathBuf>,
}

impl PitcherDatabase {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PitcherError::storage_io(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
                | OpenFlags::SQLITE_OPEN_URI,
        )?;
        debug!(path = %path.display(), "opened database");
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// In-memory database, mostly for tests.
    pub fn new_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        let mut db = Self { conn, path };
        db.initialize()?;
        Ok(db)
    }

    /// Path of the backing file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create missing tables and indices, apply pending migrations, and check
    /// that existing tables have the expected structure.
    pub fn initialize(&mut self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;

        if version > SCHEMA_VERSION {
            return Err(PitcherError::schema(format!(
                "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }

        // Tables left by an older tool must match before any migration
        // builds indices on them.
        self.verify_tables(false)?;

        let tx = self.conn.transaction()?;
        // Version 0 files may still hold such tables, so the first migration
        // only creates what is missing.
        for (from, sql) in MIGRATIONS.iter().enumerate().skip(version.max(0) as usize) {
            tx.execute_batch(sql)?;
            info!(from, to = from + 1, "applied schema migration");
        }
        tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        tx.commit()?;

        self.verify_tables(true)
    }

    /// Check every known table's columns. Absent tables are an error only
    /// when `require_all` is set.
    fn verify_tables(&self, require_all: bool) -> Result<()> {
        for (table, expected) in EXPECTED_COLUMNS {
            let mut stmt = self
                .conn
                .prepare(&format!("PRAGMA table_info({table})"))?;
            let columns = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if columns.is_empty() {
                if require_all {
                    return Err(PitcherError::schema(format!("table {table} does not exist")));
                }
                continue;
            }
            if let Some(missing) = expected.iter().find(|c| !columns.iter().any(|have| have == *c)) {
                return Err(PitcherError::schema(format!(
                    "table {table} is missing column {missing}"
                )));
            }
        }
        Ok(())
    }
}
