//! Shell execution strategy.

use std::collections::BTreeMap;
use std::path::Path;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use warden_core::{Parameters, SandboxPolicy};

use crate::error::{SandboxError, SandboxResult};
use crate::process::{ProcessOutput, configure_command, run_contained};
use crate::quoting::Quoting;
use crate::secrets::Secrets;
use crate::template::{self, Escape};

/// Build the host shell invocation for `command`.
///
/// POSIX hosts run `sh -c`; Windows runs `cmd /C` with the command passed
/// through untouched so the `^` escapes survive.
#[must_use]
pub fn shell_command(quoting: Quoting, command: &str) -> Command {
    match quoting {
        Quoting::Posix => {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        },
        Quoting::Cmd => {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C");
            #[cfg(windows)]
            cmd.raw_arg(command);
            #[cfg(not(windows))]
            cmd.arg(command);
            cmd
        },
    }
}

/// Check that every `{{...}}` placeholder in a command template stands
/// bare, where the quoted value forms its own word.
///
/// Inside `'...'` or `"..."` the inserted quotes would be literal text and
/// the value would be parsed by the shell. A placeholder right after `\`
/// or `$` would have its opening quote consumed.
///
/// # Errors
///
/// Returns [`SandboxError::Template`] naming the first offending
/// placeholder.
pub fn check_command_template(template: &str) -> SandboxResult<()> {
    let unsafe_at = |at: usize, why: &str| -> SandboxResult<()> {
        let name = template[at..]
            .get(2..)
            .and_then(|rest| rest.split("}}").next())
            .unwrap_or_default()
            .trim();
        Err(SandboxError::Template(format!(
            "placeholder '{name}' {why}; leave placeholders unquoted, values are quoted automatically"
        )))
    };

    let mut quote: Option<char> = None;
    let mut chars = template.char_indices();
    while let Some((i, c)) = chars.next() {
        if c == '{' && template[i..].starts_with("{{") {
            if let Some(q) = quote {
                let why = if q == '"' {
                    "is inside double quotes"
                } else {
                    "is inside single quotes"
                };
                return unsafe_at(i, why);
            }
            continue;
        }
        match (quote, c) {
            (Some('\''), '\'') | (Some('"'), '"') => quote = None,
            (Some('\''), _) => {},
            (_, '\\' | '$') => {
                let next = i.saturating_add(c.len_utf8());
                if template[next..].starts_with("{{") {
                    let why = if c == '$' { "follows '$'" } else { "is escaped with '\\'" };
                    return unsafe_at(next, why);
                }
                if c == '\\' {
                    chars.next();
                }
            },
            (None, '\'' | '"') => quote = Some(c),
            _ => {},
        }
    }
    Ok(())
}

/// Render a command template, quoting every substituted value for the
/// host shell.
///
/// # Errors
///
/// Returns [`SandboxError::Template`] if a placeholder is quoted in the
/// template (see [`check_command_template`]) or a referenced secret is
/// missing.
pub fn render_command(
    template: &str,
    params: &Parameters,
    secrets: &Secrets,
) -> SandboxResult<String> {
    check_command_template(template)?;
    template::render(template, params, secrets, Escape::Shell(Quoting::host()))
}

/// Run an already-rendered command under `policy`.
///
/// # Errors
///
/// See [`run_contained`].
pub async fn run_shell(
    command: &str,
    policy: &SandboxPolicy,
    work_dir: &Path,
    env: &BTreeMap<String, String>,
    cancel: &CancellationToken,
) -> SandboxResult<ProcessOutput> {
    let mut cmd = shell_command(Quoting::host(), command);
    configure_command(&mut cmd, policy, work_dir, env);
    debug!(work_dir = %work_dir.display(), "Running sandboxed shell command");
    run_contained(cmd, policy, None, cancel).await
}
