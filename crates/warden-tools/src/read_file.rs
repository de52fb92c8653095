//! Read file tool: returns contents with line numbers (cat -n style).

use std::fmt::Write;

use serde_json::Value;
use warden_core::{ActionOutput, Parameters, truncate};

use crate::{BuiltinTool, ToolContext, ToolError, ToolResult, required_str};

/// Default maximum lines to read.
const DEFAULT_LINE_LIMIT: usize = 2000;
/// Maximum line length before truncation.
const MAX_LINE_LENGTH: usize = 2000;
/// Bytes inspected for binary content.
const BINARY_SNIFF_BYTES: usize = 8192;

/// Built-in tool for reading files.
pub struct ReadFileTool;

#[async_trait::async_trait]
impl BuiltinTool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Reads a text file inside the work directory. Returns contents with line numbers. \
         Use offset and limit for large files."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the work directory"
                },
                "offset": {
                    "type": "integer",
                    "description": "Line number to start reading from (1-based)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Number of lines to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: &Parameters, ctx: &ToolContext) -> ToolResult<ActionOutput> {
        let raw_path = required_str(args, "path")?;
        let offset = args
            .get("offset")
            .and_then(Value::as_u64)
            .map(|v| usize::try_from(v).unwrap_or(usize::MAX));
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_LINE_LIMIT, |v| usize::try_from(v).unwrap_or(usize::MAX));

        let path = ctx.confine(raw_path)?;
        if !path.is_file() {
            return Err(ToolError::PathNotFound(raw_path.to_string()));
        }

        let raw = tokio::fs::read(&path).await?;
        if raw[..raw.len().min(BINARY_SNIFF_BYTES)].contains(&0) {
            return Err(ToolError::ExecutionFailed(format!(
                "{raw_path} appears to be a binary file"
            )));
        }
        let content = String::from_utf8(raw)
            .map_err(|_| ToolError::ExecutionFailed(format!("{raw_path} is not valid UTF-8")))?;

        let lines: Vec<&str> = content.lines().collect();
        let total_lines = lines.len();
        let start = offset.map_or(0, |o| o.saturating_sub(1));
        let end = start.saturating_add(limit).min(total_lines);

        if start >= total_lines {
            return Ok(ActionOutput::success(format!(
                "(file has {total_lines} lines, offset {start} is past end)"
            )));
        }

        let mut output = String::new();
        for (idx, line) in lines[start..end].iter().enumerate() {
            let line_num = start.saturating_add(idx).saturating_add(1);
            let display = truncate::truncate_at_char_boundary(line, MAX_LINE_LENGTH);
            let _ = writeln!(output, "{line_num:>6}\t{display}");
        }
        if end < total_lines {
            let _ = write!(
                output,
                "\n(showing lines {}-{end} of {total_lines}; use offset/limit for more)",
                start.saturating_add(1),
            );
        }

        let (output, _) = truncate::cap_output(&output, ctx.policy.max_output_bytes);
        Ok(ActionOutput::success(output))
    }
}
