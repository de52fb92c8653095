//! Write file tool: writes content, creating parent directories as needed.

use serde_json::Value;
use warden_core::{ActionOutput, Parameters};

use crate::{BuiltinTool, ToolContext, ToolResult, required_str};

/// Built-in tool for writing files.
pub struct WriteFileTool;

#[async_trait::async_trait]
impl BuiltinTool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Writes content to a file inside the work directory. Creates parent directories \
         and overwrites an existing file."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the work directory"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: &Parameters, ctx: &ToolContext) -> ToolResult<ActionOutput> {
        let raw_path = required_str(args, "path")?;
        let content = required_str(args, "content")?;

        let path = ctx.confine(raw_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        Ok(ActionOutput::success(format!(
            "Wrote {} bytes to {raw_path}",
            content.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolError;
    use warden_core::SandboxPolicy;

    fn args(value: Value) -> Parameters {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn writes_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(SandboxPolicy::new(dir.path()));
        let out = WriteFileTool
            .execute(
                &args(serde_json::json!({"path": "a/b/test.txt", "content": "hello world"})),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(out.output, "Wrote 11 bytes to a/b/test.txt");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a/b/test.txt")).unwrap(),
            "hello world"
        );
    }

    #[tokio::test]
    async fn missing_content_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(SandboxPolicy::new(dir.path()));
        assert!(matches!(
            WriteFileTool
                .execute(&args(serde_json::json!({"path": "x.txt"})), &ctx)
                .await,
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[tokio::test]
    async fn writes_outside_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(SandboxPolicy::new(dir.path()));
        let result = WriteFileTool
            .execute(
                &args(serde_json::json!({"path": "../warden-escape-test.txt", "content": "x"})),
                &ctx,
            )
            .await;
        assert!(matches!(result, Err(ToolError::OutsideWorkDir(_))));
    }
}
