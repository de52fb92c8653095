//! Script execution strategy.
//!
//! The source is staged in a private temporary file inside the work
//! directory and handed to the interpreter. Bound parameters arrive as a
//! JSON object on stdin; the source itself is never templated.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_core::{Parameters, SandboxPolicy};

use crate::error::{SandboxError, SandboxResult};
use crate::process::{ProcessOutput, configure_command, run_contained};

/// Run `source` with `interpreter` under `policy`.
///
/// `interpreter` may carry arguments (`"node --no-warnings"`).
///
/// # Errors
///
/// - [`SandboxError::Violation`] if the interpreter is empty
/// - [`SandboxError::Io`] if the source cannot be staged
/// - anything [`run_contained`] returns
pub async fn run_script(
    source: &str,
    interpreter: &str,
    params: &Parameters,
    policy: &SandboxPolicy,
    work_dir: &Path,
    env: &BTreeMap<String, String>,
    cancel: &CancellationToken,
) -> SandboxResult<ProcessOutput> {
    let mut parts = interpreter.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| SandboxError::Violation("no script interpreter configured".to_string()))?;

    let mut staged = tempfile::Builder::new()
        .prefix("warden-script-")
        .tempfile_in(work_dir)?;
    staged.write_all(source.as_bytes())?;
    staged.flush()?;
    // Close the handle; the path is removed when `script_path` drops.
    let script_path = staged.into_temp_path();

    let mut cmd = Command::new(program);
    cmd.args(parts).arg(&*script_path);
    configure_command(&mut cmd, policy, work_dir, env);

    let stdin = serde_json::to_vec(params)
        .map_err(|e| SandboxError::Template(format!("failed to encode parameters: {e}")))?;

    debug!(interpreter = program, "Running sandboxed script");
    let result = run_contained(cmd, policy, Some(stdin), cancel).await;
    drop(script_path);
    result
}
