#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
//! Built-in tools run by the Warden dispatcher.
//!
//! Four tools ship by default, all confined to the sandbox work directory:
//! `read_file` and `list_directory` (read-only), `write_file` and `bash`
//! (mutating). Classification and approval happen before a tool is called;
//! tools only enforce confinement.

mod bash;
mod list_directory;
mod read_file;
mod write_file;

pub use bash::BashTool;
pub use list_directory::ListDirectoryTool;
pub use read_file::ReadFileTool;
pub use write_file::WriteFileTool;

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use warden_core::{ActionError, ActionOutput, Parameters, SandboxPolicy};
use warden_sandbox::SandboxError;

/// A built-in tool that executes in-process.
#[async_trait::async_trait]
pub trait BuiltinTool: Send + Sync {
    /// Tool name, matched against `ActionKind::Builtin`.
    fn name(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// JSON schema for the tool's parameters.
    fn input_schema(&self) -> Value;

    /// Execute with validated arguments.
    async fn execute(&self, args: &Parameters, ctx: &ToolContext) -> ToolResult<ActionOutput>;
}

/// Per-invocation context.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Directory every path is confined to.
    pub work_dir: PathBuf,
    /// Containment for `bash`; `max_output_bytes` caps every tool's output.
    pub policy: SandboxPolicy,
    /// Cancels an in-flight `bash` invocation.
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Context rooted at the policy's work directory.
    #[must_use]
    pub fn new(policy: SandboxPolicy) -> Self {
        Self {
            work_dir: policy.work_dir.clone(),
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `work_dir` instead of the policy's.
    #[must_use]
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve `raw` inside the work directory.
    ///
    /// Relative paths are joined to the work directory. `..` components and
    /// symlinks are resolved before the containment check, so neither can
    /// escape.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::OutsideWorkDir`] if the resolved path is not
    /// below the work directory.
    pub fn confine(&self, raw: &str) -> ToolResult<PathBuf> {
        let root = self
            .work_dir
            .canonicalize()
            .unwrap_or_else(|_| normalize(&self.work_dir));
        let candidate = Path::new(raw);
        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            root.join(candidate)
        };
        let normalized = normalize(&joined);

        // Canonicalize the deepest existing ancestor to resolve symlinks.
        let mut existing = normalized.clone();
        let mut missing: Vec<std::ffi::OsString> = Vec::new();
        while !existing.exists() {
            match existing.file_name() {
                Some(name) => missing.push(name.to_os_string()),
                None => break,
            }
            if !existing.pop() {
                break;
            }
        }
        let mut resolved = existing.canonicalize().unwrap_or(existing);
        for name in missing.iter().rev() {
            resolved.push(name);
        }

        if resolved.starts_with(&root) {
            Ok(resolved)
        } else {
            Err(ToolError::OutsideWorkDir(raw.to_string()))
        }
    }
}

/// Lexically resolve `.` and `..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Tool execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid arguments.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Path not found.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The path resolves outside the work directory.
    #[error("path is outside the work directory: {0}")]
    OutsideWorkDir(String),

    /// Execution failed.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The sandboxed process failed.
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl ToolError {
    /// Map onto the caller-facing action taxonomy.
    #[must_use]
    pub fn to_action_error(&self) -> ActionError {
        match self {
            Self::InvalidArguments(detail) => ActionError::InvalidParameters(detail.clone()),
            Self::OutsideWorkDir(_) => ActionError::SandboxViolation(self.to_string()),
            Self::Sandbox(e) => e.to_action_error(),
            Self::PathNotFound(_) | Self::Io(_) | Self::ExecutionFailed(_) => {
                ActionError::ExecutionFailed(self.to_string())
            },
        }
    }
}

/// Result type for tool execution.
pub type ToolResult<T = String> = Result<T, ToolError>;

/// Describes a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Tool name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Parameter schema.
    pub input_schema: Value,
}

/// Registry of built-in tools.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn BuiltinTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a registry with all default tools registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ReadFileTool));
        registry.register(Box::new(ListDirectoryTool));
        registry.register(Box::new(WriteFileTool));
        registry.register(Box::new(BashTool));
        registry
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: Box<dyn BuiltinTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Get a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn BuiltinTool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions of every registered tool, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required string argument.
fn required_str<'a>(args: &'a Parameters, name: &str) -> ToolResult<&'a str> {
    args.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("{name} is required")))
}
