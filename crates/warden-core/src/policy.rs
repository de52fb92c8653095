//! Per-execution-type containment settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::env_policy::DEFAULT_INHERITED_ENV;

/// Absolute upper bound on any sandboxed execution, whatever the policy says.
///
/// Applies even when the caller disappears without cancelling.
pub const HARD_TIMEOUT_CEILING: Duration = Duration::from_secs(10 * 60);

/// Default wall-clock timeout (2 minutes).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default cap on captured output (64 KiB).
const DEFAULT_MAX_OUTPUT_BYTES: usize = 64 * 1024;

/// Default resident memory cap (1 GiB).
const DEFAULT_MAX_MEMORY_BYTES: u64 = 1024 * 1024 * 1024;

/// Containment configuration for one execution type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxPolicy {
    /// System environment variables inherited from the host process.
    pub allowed_env: Vec<String>,
    /// Working directory the process is confined to.
    pub work_dir: PathBuf,
    /// Memory cap, where the platform supports one.
    pub max_memory_bytes: Option<u64>,
    /// Wall-clock timeout.
    pub timeout: Duration,
    /// Maximum bytes of captured output returned to the caller.
    pub max_output_bytes: usize,
}

impl SandboxPolicy {
    /// Policy rooted at `work_dir` with default limits.
    #[must_use]
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            allowed_env: DEFAULT_INHERITED_ENV.iter().map(ToString::to_string).collect(),
            work_dir: work_dir.into(),
            max_memory_bytes: Some(DEFAULT_MAX_MEMORY_BYTES),
            timeout: DEFAULT_TIMEOUT,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the output cap.
    #[must_use]
    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    /// Set or clear the memory cap.
    #[must_use]
    pub fn with_max_memory_bytes(mut self, max: Option<u64>) -> Self {
        self.max_memory_bytes = max;
        self
    }

    /// Timeout clamped to [`HARD_TIMEOUT_CEILING`].
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        self.timeout.min(HARD_TIMEOUT_CEILING)
    }
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("warden-sandbox"))
    }
}
