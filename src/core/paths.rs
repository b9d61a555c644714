//! Default on-disk locations for the database and its backups.

use std::path::{Path, PathBuf};

/// Path: ~/.local/share/mlb-pitchers/pitchers.db (platform data dir)
pub fn default_database_path() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(|| {
        let mut home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.push(".local");
        home.push("share");
        home
    });
    base.join("mlb-pitchers").join("pitchers.db")
}

/// Backups live next to the database unless configured otherwise.
pub fn default_backup_dir(database_path: &Path) -> PathBuf {
    database_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("backups")
}
