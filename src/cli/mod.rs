//! CLI argument definitions and parsing.

pub mod types;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use types::{Days, PlayerId, Season};

use crate::storage::SyncOperation;

#[derive(Debug, Parser)]
#[clap(name = "mlb-pitchers", about = "MLB pitcher data pipeline", version)]
pub struct Cli {
    /// Output results as JSON instead of text lines.
    #[clap(long, global = true)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or migrate the local database.
    Init,

    /// Fetch all teams for a season and store them.
    GetTeams {
        /// Season year (e.g. 2024).
        #[clap(long, short, default_value_t = Season::default())]
        season: Season,
    },

    /// Fetch all pitchers for a season and store them.
    ///
    /// Teams referenced by a pitcher but not stored yet are fetched first.
    GetPitchers {
        /// Season year (e.g. 2024).
        #[clap(long, short, default_value_t = Season::default())]
        season: Season,
    },

    /// Search stored pitchers by name (case-insensitive substring).
    SearchPlayer {
        query: String,
    },

    /// Fetch and store one pitcher's season stats.
    GetStats {
        /// MLB player id.
        pitcher_id: PlayerId,

        /// Season year (e.g. 2024).
        #[clap(long, short, default_value_t = Season::default())]
        season: Season,
    },

    /// Import a Statcast pitch-level CSV export.
    ImportStatcast {
        path: PathBuf,

        /// Derive pitch-mix stat lines for the imported pitchers.
        #[clap(long)]
        process: bool,
    },

    /// Show a pitcher's pitch mix from stored Statcast events.
    AnalyzePitchMix {
        /// MLB player id.
        pitcher_id: PlayerId,

        /// Restrict to one season; all seasons when omitted.
        #[clap(long, short)]
        season: Option<Season>,
    },

    /// Collect stats only for pitchers who appeared in the last N days.
    GetRecent {
        /// Look-back window in days.
        #[clap(long, short, default_value_t = Days::default())]
        days: Days,

        /// Season year (e.g. 2024).
        #[clap(long, short, default_value_t = Season::default())]
        season: Season,
    },

    /// Snapshot the database.
    Backup {
        /// Label for the artifact (letters, digits, '_' or '-').
        #[clap(long, short, default_value = "manual")]
        tag: String,
    },

    /// Replace the database with a stored snapshot.
    Restore {
        artifact_id: String,
    },

    /// List stored snapshots, newest first.
    ListBackups,

    /// Show recent collection runs, newest first.
    SyncHistory {
        /// Only runs of this operation (teams, pitchers, stats, recent, statcast-import).
        #[clap(long, short)]
        operation: Option<SyncOperation>,

        /// Maximum number of runs to show.
        #[clap(long, short, default_value_t = 10)]
        limit: usize,
    },
}

impl Commands {
    /// Whether the command writes to the database.
    pub fn writes(&self) -> bool {
        matches!(
            self,
            Commands::GetTeams { .. }
                | Commands::GetPitchers { .. }
                | Commands::GetStats { .. }
                | Commands::ImportStatcast { .. }
                | Commands::GetRecent { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_stats() {
        let cli = Cli::try_parse_from(["mlb-pitchers", "get-stats", "660271", "--season", "2023"]).unwrap();
        match cli.command {
            Commands::GetStats { pitcher_id, season } => {
                assert_eq!(pitcher_id, PlayerId::new(660271));
                assert_eq!(season, Season::new(2023));
            }
            other => panic!("Expected GetStats, got {other:?}"),
        }
        assert!(!cli.json);
    }

    #[test]
    fn test_global_json_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["mlb-pitchers", "search-player", "cole", "--json"]).unwrap();
        assert!(cli.json);
    }

    #[test]
    fn test_import_statcast_process_flag() {
        let cli = Cli::try_parse_from(["mlb-pitchers", "import-statcast", "data.csv", "--process"]).unwrap();
        match cli.command {
            Commands::ImportStatcast { path, process } => {
                assert_eq!(path, PathBuf::from("data.csv"));
                assert!(process);
            }
            other => panic!("Expected ImportStatcast, got {other:?}"),
        }
    }

    #[test]
    fn test_get_recent_defaults() {
        let cli = Cli::try_parse_from(["mlb-pitchers", "get-recent"]).unwrap();
        match cli.command {
            Commands::GetRecent { days, season } => {
                assert_eq!(days, Days::new(7));
                assert_eq!(season, Season::default());
            }
            other => panic!("Expected GetRecent, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_season_rejected() {
        assert!(Cli::try_parse_from(["mlb-pitchers", "get-teams", "--season", "soon"]).is_err());
    }

    #[test]
    fn test_sync_history_operation_filter() {
        let cli = Cli::try_parse_from(["mlb-pitchers", "sync-history", "--operation", "statcast-import"]).unwrap();
        match cli.command {
            Commands::SyncHistory { operation, limit } => {
                assert_eq!(operation, Some(SyncOperation::StatcastImport));
                assert_eq!(limit, 10);
            }
            other => panic!("Expected SyncHistory, got {other:?}"),
        }
        assert!(Cli::try_parse_from(["mlb-pitchers", "sync-history", "--operation", "games"]).is_err());
    }

    #[test]
    fn test_write_commands() {
        assert!(Commands::GetTeams { season: Season::new(2024) }.writes());
        assert!(!Commands::ListBackups.writes());
        assert!(!Commands::SyncHistory { operation: None, limit: 10 }.writes());
        assert!(!Commands::Restore { artifact_id: "x".to_string() }.writes());
    }
}
