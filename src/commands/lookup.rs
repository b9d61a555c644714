//! Handlers that only read the local database

use anyhow::Context;

use super::collection::fmt_opt;
use super::{open_database, print_json};
use crate::core::config::Settings;
use crate::storage::{PitchMixEntry, Pitcher, SyncEntry, SyncOperation, SyncStatus};
use crate::{PlayerId, Season};

/// Handle `search-player`
pub fn handle_search_player(settings: &Settings, query: &str, as_json: bool) -> anyhow::Result<Vec<Pitcher>> {
    let db = open_database(settings)?;
    let pitchers = db
        .search_pitchers(query)
        .with_context(|| format!("searching pitchers for {query:?}"))?;

    if as_json {
        print_json(&pitchers)?;
    } else if pitchers.is_empty() {
        println!("No stored pitchers match {query:?}");
    } else {
        for p in &pitchers {
            println!(
                "{:<8} {:<28} team {:<4} {} ({})",
                p.id.to_string(),
                p.full_name,
                p.team_id.to_string(),
                p.handedness,
                p.season
            );
        }
    }
    Ok(pitchers)
}

/// Handle `analyze-pitch-mix`
pub fn handle_analyze_pitch_mix(
    settings: &Settings,
    pitcher_id: PlayerId,
    season: Option<Season>,
    as_json: bool,
) -> anyhow::Result<Vec<PitchMixEntry>> {
    let db = open_database(settings)?;
    let mix = db
        .pitch_mix(pitcher_id, season)
        .with_context(|| format!("computing pitch mix for pitcher {pitcher_id}"))?;

    if as_json {
        print_json(&mix)?;
        return Ok(mix);
    }
    if mix.is_empty() {
        println!("No Statcast events stored for pitcher {pitcher_id}");
        return Ok(mix);
    }

    let scope = season.map(|s| s.to_string()).unwrap_or_else(|| "all seasons".to_string());
    println!("Pitch mix for {pitcher_id} ({scope}):");
    for entry in &mix {
        println!(
            "  {:<3} {:>6} {:>6.1}%  velo {:>5} (max {:>5})  spin {:>6}",
            entry.pitch_type,
            entry.count,
            entry.share * 100.0,
            fmt_opt(entry.avg_velocity, 1),
            fmt_opt(entry.max_velocity, 1),
            fmt_opt(entry.avg_spin_rate, 0),
        );
    }
    Ok(mix)
}

/// Handle `sync-history`
pub fn handle_sync_history(
    settings: &Settings,
    operation: Option<SyncOperation>,
    limit: usize,
    as_json: bool,
) -> anyhow::Result<Vec<SyncEntry>> {
    let db = open_database(settings)?;
    let entries = db.sync_history(operation, limit).context("reading sync history")?;

    if as_json {
        print_json(&entries)?;
    } else if entries.is_empty() {
        println!("No collection runs recorded");
    } else {
        for entry in &entries {
            let c = &entry.counts;
            let outcome = match entry.status {
                SyncStatus::Success => format!(
                    "{} inserted, {} updated, {} unchanged, {} duplicates",
                    c.inserted, c.updated, c.unchanged, c.duplicates
                ),
                SyncStatus::Failed => entry.error.clone().unwrap_or_default(),
            };
            println!(
                "{}  {:<16} {:<7} {:<28} {}",
                entry.finished_at.format("%Y-%m-%d %H:%M:%S"),
                entry.operation.as_str(),
                entry.status.as_str(),
                entry.scope,
                outcome
            );
        }
    }
    Ok(entries)
}
