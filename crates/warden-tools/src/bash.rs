//! Bash tool: runs an approved command under shell containment.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;
use warden_core::{ActionOutput, Parameters};
use warden_sandbox::run_shell;

use crate::{BuiltinTool, ToolContext, ToolResult, required_str};

/// Built-in tool for executing shell commands.
pub struct BashTool;

#[async_trait::async_trait]
impl BuiltinTool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> &'static str {
        "Executes a shell command in the work directory with a cleared environment, \
         a timeout, and capped output."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: &Parameters, ctx: &ToolContext) -> ToolResult<ActionOutput> {
        let command = required_str(args, "command")?;
        let work_dir = ctx.confine(".")?;
        tokio::fs::create_dir_all(&work_dir).await?;

        debug!(work_dir = %work_dir.display(), "Running bash tool");
        let output = run_shell(command, &ctx.policy, &work_dir, &BTreeMap::new(), &ctx.cancel).await?;
        let text = output.render(ctx.policy.max_output_bytes);
        Ok(if output.success() {
            ActionOutput::success(text)
        } else {
            ActionOutput::error(text)
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ToolError;
    use std::time::Duration;
    use warden_core::SandboxPolicy;
    use warden_sandbox::SandboxError;

    fn args(command: &str) -> Parameters {
        let mut p = Parameters::new();
        p.insert("command".into(), command.into());
        p
    }

    #[tokio::test]
    async fn runs_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(SandboxPolicy::new(dir.path()));
        let out = BashTool.execute(&args("pwd"), &ctx).await.unwrap();
        assert!(!out.is_error);
        assert_eq!(out.output, dir.path().canonicalize().unwrap().to_str().unwrap());
    }

    #[tokio::test]
    async fn failure_is_an_error_output() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(SandboxPolicy::new(dir.path()));
        let out = BashTool.execute(&args("echo bad >&2; exit 1"), &ctx).await.unwrap();
        assert!(out.is_error);
        assert_eq!(out.output, "STDERR:\nbad\n(exit code: 1)");
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(
            SandboxPolicy::new(dir.path()).with_timeout(Duration::from_millis(200)),
        );
        let err = BashTool.execute(&args("sleep 10"), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(SandboxError::Timeout(_))));
    }

    #[tokio::test]
    async fn cancellation_stops_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(SandboxPolicy::new(dir.path()));
        ctx.cancel.cancel();
        let err = BashTool.execute(&args("sleep 10"), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Sandbox(SandboxError::Cancelled)));
    }
}
