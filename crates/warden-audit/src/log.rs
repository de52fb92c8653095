//! The infallible audit log front.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, error};

use crate::entry::AuditLogEntry;
use crate::error::AuditResult;
use crate::storage::{AuditStorage, FileAuditStorage, MemoryAuditStorage};

/// Append-only audit log.
///
/// [`append`](Self::append) never returns an error and never panics. A
/// failed write is reported on the `warden::diagnostic` tracing target and
/// counted in [`failed_writes`](Self::failed_writes).
#[derive(Clone)]
pub struct AuditLog {
    storage: Option<Arc<dyn AuditStorage>>,
    failed_writes: Arc<AtomicU64>,
}

impl AuditLog {
    /// Create a log over the given storage.
    #[must_use]
    pub fn new(storage: Arc<dyn AuditStorage>) -> Self {
        Self {
            storage: Some(storage),
            failed_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a JSON-lines audit file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened with owner-only
    /// permissions.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        Ok(Self::new(Arc::new(FileAuditStorage::open(path)?)))
    }

    /// An in-memory log (for testing).
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryAuditStorage::new()))
    }

    /// A log that records nothing. Entries are still traced at debug level.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            storage: None,
            failed_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an entry.
    pub fn append(&self, entry: AuditLogEntry) {
        debug!(
            action_kind = %entry.action_kind,
            execution_type = %entry.execution_type,
            outcome = ?entry.outcome,
            "Audit entry"
        );
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage.store(&entry) {
            self.failed_writes.fetch_add(1, Ordering::Relaxed);
            error!(
                target: "warden::diagnostic",
                error = %e,
                action_kind = %entry.action_kind,
                outcome = ?entry.outcome,
                "Failed to write audit entry"
            );
        }
    }

    /// Every stored entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn entries(&self) -> AuditResult<Vec<AuditLogEntry>> {
        match &self.storage {
            Some(storage) => storage.entries(),
            None => Ok(Vec::new()),
        }
    }

    /// Number of appends that failed to persist.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("enabled", &self.storage.is_some())
            .field("failed_writes", &self.failed_writes())
            .finish()
    }
}
