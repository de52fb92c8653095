//! List directory tool: directory contents with type and size info.

use std::fmt::Write;

use serde_json::Value;
use warden_core::{ActionOutput, Parameters, truncate};

use crate::{BuiltinTool, ToolContext, ToolError, ToolResult};

/// Built-in tool for listing directory contents.
pub struct ListDirectoryTool;

#[async_trait::async_trait]
impl BuiltinTool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "Lists a directory inside the work directory. Shows directories first, then files, \
         both sorted alphabetically, with file sizes."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the work directory (default: .)"
                }
            }
        })
    }

    async fn execute(&self, args: &Parameters, ctx: &ToolContext) -> ToolResult<ActionOutput> {
        let raw_path = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = ctx.confine(raw_path)?;
        if !path.exists() {
            return Err(ToolError::PathNotFound(raw_path.to_string()));
        }
        if !path.is_dir() {
            return Err(ToolError::InvalidArguments(format!(
                "{raw_path} is not a directory"
            )));
        }

        let mut listing: Vec<(bool, String, u64)> = Vec::new();
        let mut reader = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            listing.push((
                !meta.is_dir(),
                entry.file_name().to_string_lossy().into_owned(),
                meta.len(),
            ));
        }
        if listing.is_empty() {
            return Ok(ActionOutput::success(format!("{raw_path} is empty")));
        }
        // Directories (false) sort ahead of files (true).
        listing.sort();

        let dir_count = listing.iter().filter(|(is_file, ..)| !is_file).count();
        let mut output = String::new();
        for (is_file, name, len) in &listing {
            if *is_file {
                let _ = writeln!(output, "  {name}  ({})", human_size(*len));
            } else {
                let _ = writeln!(output, "  {name}/");
            }
        }
        let _ = write!(
            output,
            "\n({dir_count} directories, {} files)",
            listing.len().saturating_sub(dir_count)
        );

        let (output, _) = truncate::cap_output(&output, ctx.policy.max_output_bytes);
        Ok(ActionOutput::success(output))
    }
}

/// `bytes` with a binary unit suffix, one decimal above 1 KB.
#[allow(clippy::cast_precision_loss)]
fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = *next;
    }
    format!("{value:.1} {unit}")
}
