//! MLB pitcher data pipeline
//!
//! Collects team, pitcher and pitching-stat data from the MLB Stats API,
//! imports Statcast pitch-level CSV exports, and keeps everything in a local
//! SQLite database with checksummed backups.
//!
//! ## Features
//!
//! - **Rate-limited client**: every request is spaced by a configurable
//!   interval and retried with exponential backoff
//! - **Idempotent storage**: upserts keyed by natural keys, so re-running a
//!   collection changes nothing unless the source changed
//! - **Statcast import**: streaming CSV parse with duplicate detection and
//!   optional pitch-mix derivation
//! - **Backups**: point-in-time snapshots with SHA-256 verification on restore
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mlb_pitchers::{collect::Collector, mlb::MlbClient, storage::PitcherDatabase, Season, Settings};
//!
//! # async fn example() -> mlb_pitchers::Result<()> {
//! let settings = Settings::from_env()?;
//! let client = MlbClient::new(&settings)?;
//! let mut db = PitcherDatabase::open(&settings.database_path)?;
//!
//! let mut collector = Collector::new(&client, &mut db);
//! collector.collect_teams(Season::new(2024)).await?;
//! collector.collect_pitchers(Season::new(2024)).await?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod cli;
pub mod collect;
pub mod commands;
pub mod core;
pub mod error;
pub mod mlb;
pub mod storage;

// Re-export commonly used types
pub use cli::types::{Days, GameId, PlayerId, Season, TeamId};
pub use core::config::Settings;
pub use error::{ParseError, PitcherError, Result};
