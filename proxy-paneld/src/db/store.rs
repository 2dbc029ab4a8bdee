use std::io::Write;
use std::path::{Path, PathBuf};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use sha2::{Digest, Sha256};
use crate::collaborators::DatabaseStore;

const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";

/// The panel's SQLite database file, exported and replaced as a whole.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open or create the database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Consistent copy of the live database via `VACUUM INTO`
    fn export_blocking(path: &Path) -> Result<Vec<u8>> {
        let staging = tempfile::tempdir().context("Failed to create export staging directory")?;
        let target = staging.path().join("export.db");

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute("VACUUM INTO ?1", params![target.to_string_lossy().into_owned()])
            .context("Failed to snapshot database")?;
        drop(conn);

        let image = std::fs::read(&target).context("Failed to read database snapshot")?;
        tracing::debug!("Exported database sha256={}", digest(&image));
        Ok(image)
    }

    /// Validate `image` and swap it in for the live database, keeping a backup until it checks out
    fn import_blocking(path: &Path, image: &[u8]) -> Result<()> {
        if !image.starts_with(SQLITE_HEADER) {
            bail!("Uploaded file is not a SQLite database");
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create staging file in {}", dir.display()))?;
        staged.write_all(image).context("Failed to write staging file")?;
        staged.as_file().sync_all().context("Failed to sync staging file")?;

        check_integrity(staged.path()).context("Uploaded database failed validation")?;

        let backup = backup_path(path);
        let had_live = path.exists();
        if had_live {
            std::fs::copy(path, &backup)
                .with_context(|| format!("Failed to back up database to {}", backup.display()))?;
        }

        persist_over(staged, path, &backup, had_live)?;

        if let Err(e) = check_integrity(path) {
            roll_back(path, &backup, had_live)?;
            return Err(e.context("Replaced database failed validation, rolled back"));
        }

        if had_live {
            discard_backup(&backup);
        }

        tracing::info!("Replaced database {} sha256={}", path.display(), digest(image));
        Ok(())
    }
}

/// Move the staged file over `path`. On failure the live file is untouched and the backup is dropped.
fn persist_over(staged: tempfile::NamedTempFile, path: &Path, backup: &Path, had_live: bool) -> Result<()> {
    if let Err(e) = staged.persist(path) {
        if had_live {
            discard_backup(backup);
        }
        return Err(anyhow::Error::new(e.error)
            .context(format!("Failed to replace database: {}", path.display())));
    }
    Ok(())
}

/// Undo a swap that did not validate: put the backup back, or remove the file if there was none
fn roll_back(path: &Path, backup: &Path, had_live: bool) -> Result<()> {
    if had_live {
        std::fs::rename(backup, path)
            .with_context(|| format!("Failed to restore backup {}", backup.display()))
    } else {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove rejected database {}", path.display()))
    }
}

fn discard_backup(backup: &Path) {
    if let Err(e) = std::fs::remove_file(backup) {
        tracing::warn!("Failed to remove backup {}: {}", backup.display(), e);
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

fn digest(image: &[u8]) -> String {
    hex::encode(Sha256::digest(image))
}

fn check_integrity(path: &Path) -> Result<()> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;

    let verdict: String = conn
        .query_row("PRAGMA integrity_check", [], |row| row.get(0))
        .context("Failed to run integrity check")?;

    if verdict != "ok" {
        bail!("Integrity check failed: {}", verdict);
    }
    Ok(())
}

#[async_trait]
impl DatabaseStore for SqliteStore {
    async fn export_database(&self) -> Result<Vec<u8>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::export_blocking(&path))
            .await
            .context("Export task failed")?
    }

    async fn import_database(&self, image: Vec<u8>) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::import_blocking(&path, &image))
            .await
            .context("Import task failed")?
    }
}
