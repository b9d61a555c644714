//! Entry point: parse CLI and dispatch to command handlers.

use std::process::ExitCode;

use clap::Parser;
use mlb_pitchers::{
    cli::{Cli, Commands},
    commands::{
        backups::{auto_backup, handle_backup, handle_list_backups, handle_restore},
        collection::{
            handle_get_pitchers, handle_get_recent, handle_get_stats, handle_get_teams,
            handle_import_statcast,
        },
        handle_init,
        lookup::{handle_analyze_pitch_mix, handle_search_player, handle_sync_history},
    },
    core::init_logging,
    PitcherError, Settings,
};

/// Run the CLI.
#[tokio::main]
async fn main() -> ExitCode {
    let app = Cli::parse();

    match run(app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let kind = err
                .downcast_ref::<PitcherError>()
                .map(PitcherError::kind)
                .unwrap_or("Error");
            eprintln!("error[{kind}]: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(app: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_logging(&settings.log_level);

    if app.command.writes() {
        auto_backup(&settings);
    }

    let json = app.json;
    match app.command {
        Commands::Init => handle_init(&settings, json)?,
        Commands::GetTeams { season } => {
            handle_get_teams(&settings, season, json).await?;
        }
        Commands::GetPitchers { season } => {
            handle_get_pitchers(&settings, season, json).await?;
        }
        Commands::SearchPlayer { query } => {
            handle_search_player(&settings, &query, json)?;
        }
        Commands::GetStats { pitcher_id, season } => {
            handle_get_stats(&settings, pitcher_id, season, json).await?;
        }
        Commands::ImportStatcast { path, process } => {
            handle_import_statcast(&settings, &path, process, json)?;
        }
        Commands::AnalyzePitchMix { pitcher_id, season } => {
            handle_analyze_pitch_mix(&settings, pitcher_id, season, json)?;
        }
        Commands::GetRecent { days, season } => {
            handle_get_recent(&settings, days, season, json).await?;
        }
        Commands::Backup { tag } => {
            handle_backup(&settings, &tag, json)?;
        }
        Commands::Restore { artifact_id } => {
            handle_restore(&settings, &artifact_id, json)?;
        }
        Commands::ListBackups => {
            handle_list_backups(&settings, json)?;
        }
        Commands::SyncHistory { operation, limit } => {
            handle_sync_history(&settings, operation, limit, json)?;
        }
    }

    Ok(())
}
