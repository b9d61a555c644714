//! Command implementations for the mlb-pitchers CLI
//!
//! Each handler opens what it needs from [`Settings`], runs one pipeline
//! operation, prints the outcome and returns it for callers that want the
//! numbers.

pub mod backups;
pub mod collection;
pub mod lookup;

use anyhow::Context;
use serde::Serialize;

use crate::core::config::Settings;
use crate::mlb::MlbClient;
use crate::storage::{PitcherDatabase, UpsertSummary};


/// Open (creating or migrating) the configured database.
pub fn open_database(settings: &Settings) -> anyhow::Result<PitcherDatabase> {
    PitcherDatabase::open(&settings.database_path)
        .with_context(|| format!("opening database {}", settings.database_path.display()))
}

pub fn api_client(settings: &Settings) -> anyhow::Result<MlbClient> {
    MlbClient::new(settings).context("building MLB API client")
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn summary_line(summary: &UpsertSummary) -> String {
    format!(
        "{} inserted, {} updated, {} unchanged",
        summary.inserted, summary.updated, summary.unchanged
    )
}

/// Handle `init`: create the database and report where it lives.
pub fn handle_init(settings: &Settings, as_json: bool) -> anyhow::Result<()> {
    let _db = open_database(settings)?;
    if as_json {
        print_json(&serde_json::json!({
            "database": settings.database_path,
            "schema_version": crate::storage::SCHEMA_VERSION,
        }))?;
    } else {
        println!(
            "✓ Database ready at {} (schema v{})",
            settings.database_path.display(),
            crate::storage::SCHEMA_VERSION
        );
    }
    Ok(())
}
