//! Configuration types for the Warden gate.
//!
//! All types in this module are self-contained with no dependencies on other
//! internal warden crates. Conversion into domain types happens at the
//! runtime boundary. Every struct implements [`Default`] with the same
//! values as the embedded `defaults.toml`, so a bare `[section]` header
//! produces a working configuration.

use std::path::PathBuf;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Approval timeout, PIN, and classifier extensions.
    pub security: SecurityConfig,
    /// Sliding-window limits per category.
    pub rate_limits: RateLimitsConfig,
    /// Containment settings for the executor.
    pub sandbox: SandboxConfig,
    /// Audit log location.
    pub audit: AuditConfig,
    /// Log level and format.
    pub logging: LoggingConfig,
    /// Plugin definition and secret locations.
    pub plugins: PluginsConfig,
}

// ---------------------------------------------------------------------------
// SecurityConfig
// ---------------------------------------------------------------------------

/// Approval protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Seconds a pending request waits before it expires.
    pub approval_timeout_secs: u64,
    /// PIN verification for RED approvals.
    pub pin: PinConfig,
    /// Additions to the classifier's built-in lists.
    pub classifier: ClassifierConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            approval_timeout_secs: 300,
            pin: PinConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// PIN credential and lockout policy.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    /// Encoded salted hash (`blake3$<salt hex>$<hash hex>`).
    pub credential: Option<String>,
    /// Consecutive failures before lockout.
    pub max_failures: u32,
    /// Lockout window in seconds.
    pub lockout_secs: u64,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            credential: None,
            max_failures: 5,
            lockout_secs: 300,
        }
    }
}

impl std::fmt::Debug for PinConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinConfig")
            .field("has_credential", &self.credential.is_some())
            .field("max_failures", &self.max_failures)
            .field("lockout_secs", &self.lockout_secs)
            .finish()
    }
}

impl Serialize for PinConfig {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("PinConfig", 2)?;
        // credential is never written back out.
        state.serialize_field("max_failures", &self.max_failures)?;
        state.serialize_field("lockout_secs", &self.lockout_secs)?;
        state.end()
    }
}

/// Extra entries merged into the classifier's built-in lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Additional GREEN tool names.
    pub read_only_tools: Vec<String>,
    /// Additional YELLOW tool names.
    pub mutating_tools: Vec<String>,
    /// Additional regexes that force RED when matched in any string parameter.
    pub extra_destructive_patterns: Vec<String>,
    /// Additional key combinations that push computer actions into the
    /// destructive band (e.g. `ctrl+alt+backspace`).
    pub dangerous_key_combos: Vec<String>,
}

// ---------------------------------------------------------------------------
// RateLimitsConfig
// ---------------------------------------------------------------------------

/// Rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Upper bound on tracked `(category, identity)` keys.
    pub max_keys: usize,
    /// PIN submissions.
    pub auth: WindowConfig,
    /// Plugin executions.
    pub plugin_execution: WindowConfig,
    /// Calls to `submit`.
    pub api: WindowConfig,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            max_keys: 10_000,
            auth: WindowConfig::new(300, 5),
            plugin_execution: WindowConfig::new(60, 30),
            api: WindowConfig::new(60, 120),
        }
    }
}

/// One sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Requests allowed per window.
    pub max_requests: u32,
}

impl WindowConfig {
    /// Build a window.
    #[must_use]
    pub const fn new(window_secs: u64, max_requests: u32) -> Self {
        Self {
            window_secs,
            max_requests,
        }
    }
}

// ---------------------------------------------------------------------------
// SandboxConfig
// ---------------------------------------------------------------------------

/// Executor containment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Working directory for sandboxed processes. Defaults to
    /// `<temp>/warden-sandbox`.
    pub work_dir: Option<PathBuf>,
    /// The server's own installation tree. Processes are never run there.
    pub install_dir: Option<PathBuf>,
    /// Host variables inherited by sandboxed processes.
    pub allowed_env: Vec<String>,
    /// Interpreter for script plugins without their own.
    pub script_interpreter: String,
    /// Limits for shell executions.
    pub shell: ProcessLimitsConfig,
    /// Limits for script executions.
    pub script: ProcessLimitsConfig,
    /// Outbound HTTP settings.
    pub http: HttpConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            install_dir: None,
            allowed_env: [
                "PATH",
                "HOME",
                "USER",
                "LOGNAME",
                "LANG",
                "LC_ALL",
                "LC_CTYPE",
                "TERM",
                "TMPDIR",
                "TMP",
                "TEMP",
                "SYSTEMROOT",
                "WINDIR",
                "COMSPEC",
                "PATHEXT",
                "USERPROFILE",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            script_interpreter: "python3".to_string(),
            shell: ProcessLimitsConfig::default(),
            script: ProcessLimitsConfig {
                timeout_secs: 60,
                max_memory_bytes: Some(512 * 1024 * 1024),
                max_output_bytes: 64 * 1024,
            },
            http: HttpConfig::default(),
        }
    }
}

/// Limits for a child-process strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessLimitsConfig {
    /// Wall-clock timeout.
    pub timeout_secs: u64,
    /// Address-space cap, where supported.
    pub max_memory_bytes: Option<u64>,
    /// Cap on captured stdout+stderr.
    pub max_output_bytes: usize,
}

impl Default for ProcessLimitsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            max_memory_bytes: Some(1024 * 1024 * 1024),
            max_output_bytes: 64 * 1024,
        }
    }
}

/// Outbound HTTP settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout.
    pub timeout_secs: u64,
    /// Cap on the response body returned to the caller.
    pub max_response_bytes: usize,
    /// Permit private, loopback and link-local targets. Metadata hosts stay
    /// blocked. Only for local development.
    pub allow_private_networks: bool,
    /// Hostnames blocked in addition to the built-in metadata list.
    pub extra_blocked_hosts: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_response_bytes: 1024 * 1024,
            allow_private_networks: false,
            extra_blocked_hosts: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditConfig / LoggingConfig / PluginsConfig
// ---------------------------------------------------------------------------

/// Audit log location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether entries are persisted.
    pub enabled: bool,
    /// Audit file path. Defaults to `<warden home>/audit.jsonl`.
    pub path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level.
    pub level: String,
    /// `pretty`, `compact`, `full` or `json`.
    pub format: String,
    /// Extra filter directives.
    pub directives: Vec<String>,
    /// Write daily-rolling files here instead of stderr.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
            directives: Vec::new(),
            file_dir: None,
        }
    }
}

/// Where operator plugin definitions and secrets live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory of operator-installed `*.toml` definitions.
    pub dir: Option<PathBuf>,
    /// Secrets file referenced by `{{secret.NAME}}` placeholders.
    pub secrets_file: Option<PathBuf>,
}
