//! Backup, restore and listing handlers

use anyhow::Context;

use super::print_json;
use crate::backup::{BackupArtifact, BackupManager};
use crate::core::config::Settings;

/// Handle `backup`
pub fn handle_backup(settings: &Settings, tag: &str, as_json: bool) -> anyhow::Result<BackupArtifact> {
    let manager = BackupManager::from_settings(settings);
    let artifact = manager
        .backup(tag)
        .with_context(|| format!("backing up {}", settings.database_path.display()))?;

    if as_json {
        print_json(&artifact)?;
    } else {
        println!("✓ Backup {} written to {}", artifact.id, artifact.path.display());
        println!("  sha256 {}", artifact.checksum);
    }
    Ok(artifact)
}

/// Handle `restore`
pub fn handle_restore(settings: &Settings, artifact_id: &str, as_json: bool) -> anyhow::Result<BackupArtifact> {
    let manager = BackupManager::from_settings(settings);
    let artifact = manager
        .restore(artifact_id)
        .with_context(|| format!("restoring {artifact_id} from {}", manager.backup_dir().display()))?;

    if as_json {
        print_json(&artifact)?;
    } else {
        println!(
            "✓ Restored {} to {}",
            artifact.id,
            settings.database_path.display()
        );
    }
    Ok(artifact)
}

/// Handle `list-backups`
pub fn handle_list_backups(settings: &Settings, as_json: bool) -> anyhow::Result<Vec<BackupArtifact>> {
    let manager = BackupManager::from_settings(settings);
    let artifacts = manager
        .list()
        .with_context(|| format!("reading manifest in {}", manager.backup_dir().display()))?;

    if as_json {
        print_json(&artifacts)?;
    } else if artifacts.is_empty() {
        println!("No backups in {}", manager.backup_dir().display());
    } else {
        for a in &artifacts {
            println!(
                "{:<40} {}  {}",
                a.id,
                a.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                &a.checksum[..12.min(a.checksum.len())]
            );
        }
    }
    Ok(artifacts)
}

/// Take the scheduled backup before a write command; failures are logged,
/// never fatal.
pub fn auto_backup(settings: &Settings) {
    let manager = BackupManager::from_settings(settings);
    match manager.backup_if_due("auto") {
        Ok(Some(artifact)) => tracing::info!(id = %artifact.id, "scheduled backup taken"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "scheduled backup skipped"),
    }
}
