//! Handlers for commands that fetch or import data and write it to storage

use std::path::Path;

use anyhow::Context;
use chrono::Local;

use super::{api_client, open_database, print_json, summary_line};
use crate::collect::{Collector, ImportReport, RecentReport, StatOutcome};
use crate::core::config::Settings;
use crate::storage::UpsertSummary;
use crate::{Days, PlayerId, Season};

/// Handle `get-teams`
pub async fn handle_get_teams(settings: &Settings, season: Season, as_json: bool) -> anyhow::Result<UpsertSummary> {
    let client = api_client(settings)?;
    let mut db = open_database(settings)?;

    let summary = Collector::new(&client, &mut db)
        .collect_teams(season)
        .await
        .with_context(|| format!("collecting teams for season {season}"))?;

    if as_json {
        print_json(&summary)?;
    } else {
        println!("✓ Teams for {season}: {}", summary_line(&summary));
    }
    Ok(summary)
}

/// Handle `get-pitchers`
pub async fn handle_get_pitchers(settings: &Settings, season: Season, as_json: bool) -> anyhow::Result<UpsertSummary> {
    let client = api_client(settings)?;
    let mut db = open_database(settings)?;

    let summary = Collector::new(&client, &mut db)
        .collect_pitchers(season)
        .await
        .with_context(|| format!("collecting pitchers for season {season}"))?;

    if as_json {
        print_json(&summary)?;
    } else {
        println!("✓ Pitchers for {season}: {}", summary_line(&summary));
    }
    Ok(summary)
}

/// Handle `get-stats`
pub async fn handle_get_stats(
    settings: &Settings,
    pitcher_id: PlayerId,
    season: Season,
    as_json: bool,
) -> anyhow::Result<Option<StatOutcome>> {
    let client = api_client(settings)?;
    let mut db = open_database(settings)?;

    let outcome = Collector::new(&client, &mut db)
        .collect_stats(pitcher_id, season)
        .await
        .with_context(|| format!("collecting stats for pitcher {pitcher_id}, season {season}"))?;

    if as_json {
        print_json(&outcome)?;
        return Ok(outcome);
    }
    match &outcome {
        Some(StatOutcome { stat, outcome }) => {
            println!("✓ Pitcher {pitcher_id}, season {season}: {outcome:?}");
            println!(
                "  ERA {}  K {}  IP {}  WHIP {}",
                fmt_opt(stat.era, 2),
                stat.strikeouts.map(|k| k.to_string()).unwrap_or_else(|| "-".to_string()),
                fmt_opt(stat.innings_pitched, 1),
                fmt_opt(stat.whip, 2),
            );
        }
        None => println!("No stats reported for pitcher {pitcher_id} in {season}"),
    }
    Ok(outcome)
}

/// Handle `get-recent`
pub async fn handle_get_recent(
    settings: &Settings,
    days: Days,
    season: Season,
    as_json: bool,
) -> anyhow::Result<RecentReport> {
    let client = api_client(settings)?;
    let mut db = open_database(settings)?;
    let today = Local::now().date_naive();

    let report = Collector::new(&client, &mut db)
        .collect_recent(days, season, today)
        .await
        .with_context(|| format!("collecting stats for the last {days} days of season {season}"))?;

    if as_json {
        print_json(&report)?;
    } else {
        println!(
            "✓ {} pitchers active since {}: {} ({} without stats)",
            report.active,
            report.start.map(|d| d.to_string()).unwrap_or_default(),
            summary_line(&report.summary),
            report.without_stats
        );
    }
    Ok(report)
}

/// Handle `import-statcast`
pub fn handle_import_statcast(
    settings: &Settings,
    path: &Path,
    process: bool,
    as_json: bool,
) -> anyhow::Result<ImportReport> {
    let client = api_client(settings)?;
    let mut db = open_database(settings)?;

    let report = Collector::new(&client, &mut db)
        .import_statcast_csv(path, process)
        .with_context(|| format!("importing {}", path.display()))?;

    if as_json {
        print_json(&report)?;
    } else {
        println!(
            "✓ {}: {} rows, {} inserted, {} duplicates skipped",
            path.display(),
            report.rows,
            report.inserted,
            report.duplicates
        );
        if process {
            println!("  {} pitch-mix lines written", report.pitch_mix_rows);
        }
    }
    Ok(report)
}

pub(crate) fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{v:.precision$}"))
        .unwrap_or_else(|| "-".to_string())
}
