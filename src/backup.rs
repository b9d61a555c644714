//! Database snapshots with checksums, a manifest, and rotation.
//!
//! A backup copies the live SQLite file while holding a write reservation, so
//! no other connection can be part-way through a write. Restore re-verifies
//! the stored checksum and swaps the file in with a rename.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::core::config::Settings;
use crate::error::{PitcherError, Result};


pub const MANIFEST_FILE: &str = "manifest.json";
/// Artifacts kept by default; older ones are rotated out.
pub const DEFAULT_MAX_BACKUPS: usize = 10;

const ARTIFACT_EXTENSION: &str = "sqlite";
const COPY_BUFFER_BYTES: usize = 64 * 1024;
const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// One stored snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArtifact {
    /// File stem of the artifact, used to name it on restore.
    pub id: String,
    pub tag: String,
    pub created_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the artifact file.
    pub checksum: String,
    pub path: PathBuf,
    /// Database file the snapshot was taken from.
    pub source: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    artifacts: Vec<BackupArtifact>,
}

pub struct BackupManager {
    database_path: PathBuf,
    backup_dir: PathBuf,
    interval: ChronoDuration,
    /// 0 keeps every artifact.
    retention: usize,
}

impl BackupManager {
    pub fn new(database_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>, interval_days: u32) -> Self {
        Self {
            database_path: database_path.into(),
            backup_dir: backup_dir.into(),
            interval: ChronoDuration::days(i64::from(interval_days)),
            retention: DEFAULT_MAX_BACKUPS,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.database_path,
            &settings.backup_dir,
            settings.backup_interval_days,
        )
        .with_retention(settings.max_backups)
    }

    pub fn with_retention(mut self, keep: usize) -> Self {
        self.retention = keep;
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot the live database under `tag`.
    pub fn backup(&self, tag: &str) -> Result<BackupArtifact> {
        validate_tag(tag)?;
        if !self.database_path.is_file() {
            return Err(PitcherError::backup(format!(
                "database {} does not exist",
                self.database_path.display()
            )));
        }
        fs::create_dir_all(&self.backup_dir).map_err(|e| {
            PitcherError::backup(format!("cannot create {}: {e}", self.backup_dir.display()))
        })?;

        let mut manifest = self.load_manifest().map_err(|e| PitcherError::backup(e.to_string()))?;
        let created_at = Utc::now();
        let id = self.unused_id(tag, created_at, &manifest);
        let path = self.backup_dir.join(format!("{id}.{ARTIFACT_EXTENSION}"));

        // Held until the copy is on disk; dropping it releases the reservation.
        let lock = self.reserve_writes().map_err(PitcherError::backup)?;
        let checksum = copy_with_checksum(&self.database_path, &path)
            .map_err(|e| PitcherError::backup(format!("copying to {}: {e}", path.display())))?;
        drop(lock);

        let artifact = BackupArtifact {
            id,
            tag: tag.to_string(),
            created_at,
            checksum,
            path,
            source: self.database_path.clone(),
        };
        manifest.artifacts.push(artifact.clone());
        let rotated = self.rotate(&mut manifest);
        self.save_manifest(&manifest)
            .map_err(|e| PitcherError::backup(format!("writing manifest: {e}")))?;

        for old in rotated {
            match fs::remove_file(&old.path) {
                Ok(()) => info!(id = %old.id, "rotated out old backup"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(id = %old.id, error = %e, "could not delete rotated backup"),
            }
        }

        info!(id = %artifact.id, checksum = %artifact.checksum, "backup written");
        Ok(artifact)
    }

    /// Drop manifest entries beyond the retention count, oldest first, and
    /// return them so their files can be deleted once the manifest is saved.
    fn rotate(&self, manifest: &mut Manifest) -> Vec<BackupArtifact> {
        if self.retention == 0 || manifest.artifacts.len() <= self.retention {
            return Vec::new();
        }
        manifest.artifacts.sort_by(newest_first);
        let rotated = manifest.artifacts.split_off(self.retention);
        manifest.artifacts.reverse();
        rotated
    }

    /// Back up only if the newest artifact is older than the interval.
    pub fn backup_if_due(&self, tag: &str) -> Result<Option<BackupArtifact>> {
        if !self.database_path.is_file() {
            debug!("no database yet, skipping scheduled backup");
            return Ok(None);
        }
        let newest = self.list()?.into_iter().next();
        if let Some(newest) = newest {
            let age = Utc::now() - newest.created_at;
            if age < self.interval {
                debug!(newest = %newest.id, "backup not due");
                return Ok(None);
            }
        }
        self.backup(tag).map(Some)
    }

    /// Recorded artifacts, newest first.
    pub fn list(&self) -> Result<Vec<BackupArtifact>> {
        let mut artifacts = self.load_manifest()?.artifacts;
        artifacts.sort_by(newest_first);
        Ok(artifacts)
    }

    /// Replace the live database with a verified artifact.
    pub fn restore(&self, artifact_id: &str) -> Result<BackupArtifact> {
        let manifest = self.load_manifest().map_err(|e| PitcherError::restore(e.to_string()))?;
        let artifact = manifest
            .artifacts
            .into_iter()
            .find(|a| a.id == artifact_id)
            .ok_or_else(|| PitcherError::restore(format!("no artifact named {artifact_id}")))?;

        let actual = file_checksum(&artifact.path)
            .map_err(|e| PitcherError::restore(format!("reading {}: {e}", artifact.path.display())))?;
        if actual != artifact.checksum {
            return Err(PitcherError::restore(format!(
                "checksum mismatch for {}: recorded {}, found {actual}",
                artifact.id, artifact.checksum
            )));
        }

        if let Some(parent) = self.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| PitcherError::restore(format!("cannot create {}: {e}", parent.display())))?;
        }
        if self.database_path.is_file() {
            // Refuse to swap the file out from under an active writer.
            drop(self.reserve_writes().map_err(PitcherError::restore)?);
        }

        let staging = sibling_with_suffix(&self.database_path, ".restore-tmp");
        let copied = copy_with_checksum(&artifact.path, &staging)
            .map_err(|e| PitcherError::restore(format!("staging {}: {e}", staging.display())))?;
        if copied != artifact.checksum {
            let _ = fs::remove_file(&staging);
            return Err(PitcherError::restore(format!(
                "staged copy of {} does not match its checksum",
                artifact.id
            )));
        }

        for suffix in SIDECAR_SUFFIXES {
            let sidecar = sibling_with_suffix(&self.database_path, suffix);
            if sidecar.exists() {
                warn!(path = %sidecar.display(), "removing stale sidecar");
                fs::remove_file(&sidecar)
                    .map_err(|e| PitcherError::restore(format!("removing {}: {e}", sidecar.display())))?;
            }
        }
        fs::rename(&staging, &self.database_path).map_err(|e| {
            PitcherError::restore(format!("replacing {}: {e}", self.database_path.display()))
        })?;

        info!(id = %artifact.id, path = %self.database_path.display(), "database restored");
        Ok(artifact)
    }

    /// Open a connection and take SQLite's RESERVED lock without waiting.
    fn reserve_writes(&self) -> std::result::Result<Connection, String> {
        let conn = Connection::open_with_flags(&self.database_path, OpenFlags::SQLITE_OPEN_READ_WRITE)
            .map_err(|e| format!("opening {}: {e}", self.database_path.display()))?;
        conn.busy_timeout(std::time::Duration::ZERO)
            .map_err(|e| e.to_string())?;
        let describe = |e: rusqlite::Error| match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                format!("database {} is busy with another write", self.database_path.display())
            }
            _ => format!("cannot lock {}: {e}", self.database_path.display()),
        };
        conn.execute_batch("BEGIN IMMEDIATE").map_err(describe)?;
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(describe)?;
        Ok(conn)
    }

    fn manifest_path(&self) -> PathBuf {
        self.backup_dir.join(MANIFEST_FILE)
    }

    fn load_manifest(&self) -> Result<Manifest> {
        let path = self.manifest_path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Manifest::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save_manifest(&self, manifest: &Manifest) -> Result<()> {
        let path = self.manifest_path();
        let staging = sibling_with_suffix(&path, ".tmp");
        fs::write(&staging, serde_json::to_string_pretty(manifest)?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn unused_id(&self, tag: &str, at: DateTime<Utc>, manifest: &Manifest) -> String {
        let base = format!("{tag}_{}", at.format("%Y%m%dT%H%M%SZ"));
        let taken = |id: &str| {
            manifest.artifacts.iter().any(|a| a.id == id)
                || self.backup_dir.join(format!("{id}.{ARTIFACT_EXTENSION}")).exists()
        };
        let mut id = base.clone();
        let mut n = 1;
        while taken(&id) {
            id = format!("{base}-{n}");
            n += 1;
        }
        id
    }
}

/// Tags end up in file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_tag(tag: &str) -> Result<()> {
    let valid = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(PitcherError::backup(format!(
            "invalid tag {tag:?}: use letters, digits, '_' or '-'"
        )))
    }
}

fn newest_first(a: &BackupArtifact, b: &BackupArtifact) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Copy `from` to `to`, fsync it, and return the hex SHA-256 of the bytes.
///
/// A failed copy leaves no file at `to`.
fn copy_with_checksum(from: &Path, to: &Path) -> std::io::Result<String> {
    let result = write_copy(from, to);
    if result.is_err() {
        if let Err(e) = fs::remove_file(to) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %to.display(), error = %e, "could not remove partial copy");
            }
        }
    }
    result
}

fn write_copy(from: &Path, to: &Path) -> std::io::Result<String> {
    let mut source = File::open(from)?;
    let mut target = File::create(to)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        target.write_all(&buf[..n])?;
    }
    target.sync_all()?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
