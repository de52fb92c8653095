//! Audit storage trait and backends.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::entry::AuditLogEntry;
use crate::error::{AuditError, AuditResult};

/// Storage backend for audit logs.
///
/// Implementations must be thread-safe; `store` is the only write and is
/// append-only.
pub trait AuditStorage: Send + Sync {
    /// Append an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be persisted.
    fn store(&self, entry: &AuditLogEntry) -> AuditResult<()>;

    /// Read back every entry in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or deserialization fails.
    fn entries(&self) -> AuditResult<Vec<AuditLogEntry>>;
}

/// JSON-lines file backend.
///
/// The file is created `0600` on Unix. An existing file with wider
/// permissions is tightened on open.
pub struct FileAuditStorage {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditStorage {
    /// Open or create the audit file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directory cannot be
    /// created, or its permissions cannot be restricted.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path)?;
        restrict_permissions(&path, &file)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Location of the audit file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, file: &File) -> AuditResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = file.metadata()?.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        tracing::warn!(
            path = %path.display(),
            mode = %format_args!("{mode:o}"),
            "Audit file was accessible by other users, restricting to 0600"
        );
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        let now = file.metadata()?.permissions().mode() & 0o777;
        if now & 0o077 != 0 {
            return Err(AuditError::InsecurePermissions {
                path: path.display().to_string(),
                mode: now,
            });
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _file: &File) -> AuditResult<()> {
    Ok(())
}

impl AuditStorage for FileAuditStorage {
    fn store(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| AuditError::SerializationError(e.to_string()))?;
        line.push(b'\n');

        // Single write under the lock so concurrent appends never interleave.
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditLogEntry>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line)
                .map_err(|e| AuditError::SerializationError(e.to_string()))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl std::fmt::Debug for FileAuditStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAuditStorage")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// In-memory backend (for testing).
#[derive(Debug, Default)]
pub struct MemoryAuditStorage {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditStorage {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStorage for MemoryAuditStorage {
    fn store(&self, entry: &AuditLogEntry) -> AuditResult<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }

    fn entries(&self) -> AuditResult<Vec<AuditLogEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}
