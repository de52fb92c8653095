//! Child-process containment shared by the shell and script strategies.
//!
//! Every child runs with a cleared environment, a vetted working
//! directory, piped stdio and its own process group. The group is killed
//! when the execution times out, is cancelled, or finishes, so background
//! descendants never outlive the request.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use warden_core::{SandboxPolicy, env_policy, truncate};

use crate::error::{SandboxError, SandboxResult};

/// Paths that are refused as a working directory, along with everything
/// below them.
const BLOCKED_TREES: &[&str] = &[
    "/etc", "/bin", "/sbin", "/usr", "/boot", "/dev", "/proc", "/sys", "/lib", "/lib64", "/root",
    "/System", "/Library", "C:\\Windows",
];

/// Paths refused only as an exact match; their subdirectories are fine.
const BLOCKED_EXACT: &[&str] = &["/", "/var", "/home", "/Users", "C:\\"];

/// Read buffer size for captured output.
const READ_CHUNK: usize = 8 * 1024;

/// How long output is still drained once the child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Kills a process group when dropped.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    /// Guard the group led by `pid`.
    #[must_use]
    pub fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    /// Send `SIGKILL` to the group now. Later calls do nothing.
    pub fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        kill_group(pgid);
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: every member already exited.
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {},
        Err(e) => debug!(pgid, error = %e, "Failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {
    // kill_on_drop terminates the direct child.
}

/// Choose the working directory for a child process.
///
/// `requested` is used unless it lies inside `install_dir` or is a
/// sensitive system path, in which case `fallback` is used instead.
#[must_use]
pub fn safe_work_dir(requested: &Path, install_dir: Option<&Path>, fallback: &Path) -> PathBuf {
    let resolved = requested
        .canonicalize()
        .unwrap_or_else(|_| requested.to_path_buf());

    if let Some(install) = install_dir {
        let install = install
            .canonicalize()
            .unwrap_or_else(|_| install.to_path_buf());
        if resolved.starts_with(&install) {
            warn!(
                requested = %requested.display(),
                fallback = %fallback.display(),
                "Refusing to run inside the installation directory"
            );
            return fallback.to_path_buf();
        }
    }

    if is_sensitive_dir(&resolved) {
        warn!(
            requested = %requested.display(),
            fallback = %fallback.display(),
            "Refusing to run in a system directory"
        );
        return fallback.to_path_buf();
    }
    resolved
}

fn is_sensitive_dir(path: &Path) -> bool {
    BLOCKED_EXACT.iter().any(|b| path == Path::new(b))
        || BLOCKED_TREES.iter().any(|b| path.starts_with(b))
}

/// Apply the environment, directory, stdio and process-group settings.
///
/// `plugin_env` entries on the spawn blocklist are dropped with a warning.
#[allow(unsafe_code)]
pub fn configure_command<'a>(
    cmd: &mut Command,
    policy: &SandboxPolicy,
    work_dir: &Path,
    plugin_env: impl IntoIterator<Item = (&'a String, &'a String)>,
) {
    cmd.env_clear();
    cmd.envs(env_policy::inherited_env(&policy.allowed_env));
    for (key, value) in plugin_env {
        if env_policy::is_blocked_spawn_env(key) {
            warn!(key = %key, "Ignoring blocked env var from plugin definition");
            continue;
        }
        cmd.env(key, value);
    }

    cmd.current_dir(work_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(target_os = "linux")]
    if let Some(limit) = policy.max_memory_bytes {
        // SAFETY: pre_exec runs between fork() and exec(). The closure only
        // calls setrlimit, which is async-signal-safe, and converts the
        // errno into an io::Error without allocating.
        unsafe {
            cmd.pre_exec(move || {
                nix::sys::resource::setrlimit(nix::sys::resource::Resource::RLIMIT_AS, limit, limit)
                    .map_err(std::io::Error::from)
            });
        }
    }
}

/// Captured result of a contained child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Captured stdout, capped.
    pub stdout: String,
    /// Captured stderr, capped.
    pub stderr: String,
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Whether any stream was clipped.
    pub truncated: bool,
}

impl ProcessOutput {
    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined text: stdout, a `STDERR:` section, and the exit code when
    /// it is not zero. Capped at `max_bytes`.
    #[must_use]
    pub fn render(&self, max_bytes: usize) -> String {
        let mut text = String::new();
        if !self.stdout.is_empty() {
            text.push_str(self.stdout.trim_end());
        }
        if !self.stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("STDERR:\n");
            text.push_str(self.stderr.trim_end());
        }
        if !self.success() {
            if !text.is_empty() {
                text.push('\n');
            }
            match self.exit_code {
                Some(code) => text.push_str(&format!("(exit code: {code})")),
                None => text.push_str("(terminated by signal)"),
            }
        }
        if text.is_empty() {
            text.push_str("(no output)");
        }

        let (mut capped, clipped) = truncate::cap_output(&text, max_bytes);
        if self.truncated && !clipped {
            capped.push_str(&truncate::truncation_marker(max_bytes));
        }
        capped
    }
}

/// Spawn `cmd` and wait for it under the policy's timeout and `cancel`.
///
/// `stdin` is written to the child and then closed.
///
/// # Errors
///
/// - [`SandboxError::Spawn`] if the process cannot start
/// - [`SandboxError::Timeout`] when the effective timeout elapses
/// - [`SandboxError::Cancelled`] when `cancel` fires first
pub async fn run_contained(
    mut cmd: Command,
    policy: &SandboxPolicy,
    stdin: Option<Vec<u8>>,
    cancel: &CancellationToken,
) -> SandboxResult<ProcessOutput> {
    let mut child = cmd.spawn().map_err(|e| {
        warn!(target: "warden::diagnostic", error = %e, "Failed to spawn sandboxed process");
        SandboxError::Spawn("failed to start process".to_string())
    })?;
    let mut guard = ProcessGroupGuard::new(child.id());

    let child_stdin = child.stdin.take();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let max = policy.max_output_bytes;

    let feed = async move {
        if let Some(mut pipe) = child_stdin {
            if let Some(bytes) = stdin {
                // A child that exits without reading stdin closes the pipe.
                let _ = pipe.write_all(&bytes).await;
            }
            drop(pipe);
        }
    };

    let run = async {
        let mut out = Captured::default();
        let mut err = Captured::default();
        let status = {
            let capture = async {
                let (read_out, read_err, ()) = tokio::join!(
                    read_capped(stdout, max, &mut out),
                    read_capped(stderr, max, &mut err),
                    feed,
                );
                read_out.and(read_err)
            };
            let exited = child.wait();
            tokio::pin!(capture, exited);
            tokio::select! {
                captured = &mut capture => {
                    captured?;
                    exited.await?
                },
                status = &mut exited => {
                    let status = status?;
                    // Background descendants may still hold the pipes open.
                    guard.kill();
                    match tokio::time::timeout(DRAIN_GRACE, &mut capture).await {
                        Ok(captured) => captured?,
                        Err(_) => debug!("Output pipes still open after exit, keeping what was read"),
                    }
                    status
                },
            }
        };
        let truncated = out.clipped || err.clipped;
        Ok::<_, std::io::Error>(ProcessOutput {
            stdout: out.into_text(max),
            stderr: err.into_text(max),
            exit_code: status.code(),
            truncated,
        })
    };

    let timeout = policy.effective_timeout();
    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(SandboxError::Cancelled),
        res = tokio::time::timeout(timeout, run) => match res {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SandboxError::Io(e)),
            Err(_) => Err(SandboxError::Timeout(timeout)),
        },
    };

    guard.kill();
    if let Err(e) = &result {
        debug!(error = %e, "Sandboxed process did not complete");
    }
    result
}

/// Bytes read from one output stream.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    clipped: bool,
}

impl Captured {
    fn into_text(self, max: usize) -> String {
        let text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.clipped {
            // Lossy decoding may have split a multibyte character at the cut.
            return truncate::truncate_at_char_boundary(&text, max);
        }
        text
    }
}

/// Read `reader` to the end into `into`, keeping at most `max` bytes.
///
/// Reading continues past the cap so the child never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, max: usize, into: &mut Captured) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let room = max.saturating_sub(into.bytes.len());
        if n > room {
            into.clipped = true;
        }
        into.bytes.extend_from_slice(&buf[..n.min(room)]);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn policy(dir: &Path) -> SandboxPolicy {
        SandboxPolicy::new(dir).with_timeout(Duration::from_secs(10))
    }

    fn sh(script: &str, policy: &SandboxPolicy, env: &BTreeMap<String, String>) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        configure_command(&mut cmd, policy, &policy.work_dir, env);
        cmd
    }

    #[test]
    fn system_directories_are_redirected() {
        let fallback = Path::new("/tmp/warden-fallback");
        for dir in ["/", "/etc", "/etc/ssh", "/usr/bin", "/proc/self", "/home", "/var"] {
            assert_eq!(safe_work_dir(Path::new(dir), None, fallback), fallback, "{dir}");
        }
    }

    #[test]
    fn install_tree_is_redirected() {
        let install = tempfile::tempdir().unwrap();
        let nested = install.path().join("bin");
        std::fs::create_dir_all(&nested).unwrap();
        let fallback = Path::new("/tmp/warden-fallback");
        assert_eq!(safe_work_dir(&nested, Some(install.path()), fallback), fallback);
    }

    #[test]
    fn ordinary_directory_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let chosen = safe_work_dir(dir.path(), None, Path::new("/tmp/other"));
        assert_eq!(chosen, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn render_formats_sections() {
        let out = ProcessOutput {
            stdout: "hello\n".into(),
            stderr: "warn\n".into(),
            exit_code: Some(2),
            truncated: false,
        };
        assert_eq!(out.render(1024), "hello\nSTDERR:\nwarn\n(exit code: 2)");

        let empty = ProcessOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            truncated: false,
        };
        assert_eq!(empty.render(1024), "(no output)");
    }

    #[tokio::test]
    async fn environment_is_allow_listed() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = BTreeMap::new();
        env.insert("PLUGIN_MODE".to_string(), "fast".to_string());
        env.insert("LD_PRELOAD".to_string(), "/tmp/evil.so".to_string());
        let cmd = sh("env", &policy(dir.path()), &env);
        let out = run_contained(cmd, &policy(dir.path()), None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.stdout.contains("PLUGIN_MODE=fast"));
        assert!(!out.stdout.contains("LD_PRELOAD"));
        for line in out.stdout.lines() {
            let name = line.split('=').next().unwrap();
            let allowed = policy(dir.path()).allowed_env.iter().any(|a| a == name)
                || name == "PLUGIN_MODE"
                || name == "PWD"
                || name == "SHLVL"
                || name == "_"
                || name == "OLDPWD";
            assert!(allowed, "unexpected variable {name}");
        }
    }

    #[tokio::test]
    async fn runs_in_work_dir_and_reads_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let p = policy(dir.path());
        let cmd = sh("pwd; cat", &p, &BTreeMap::new());
        let out = run_contained(cmd, &p, Some(b"from stdin".to_vec()), &CancellationToken::new())
            .await
            .unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert!(out.stdout.starts_with(canonical.to_str().unwrap()));
        assert!(out.stdout.ends_with("from stdin"));
    }

    #[tokio::test]
    async fn timeout_kills_the_whole_group() {
        let dir = tempfile::tempdir().unwrap();
        let p = policy(dir.path()).with_timeout(Duration::from_millis(300));
        let marker = dir.path().join("survived");
        let script = format!("(sleep 2; touch {}) & sleep 30", marker.display());
        let cmd = sh(&script, &p, &BTreeMap::new());
        let err = run_contained(cmd, &p, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!marker.exists(), "background child outlived the timeout");
    }

    #[tokio::test]
    async fn background_child_does_not_hold_up_the_result() {
        let dir = tempfile::tempdir().unwrap();
        let p = policy(dir.path()).with_timeout(Duration::from_secs(2));
        let cmd = sh("sleep 30 & echo started", &p, &BTreeMap::new());
        let started = std::time::Instant::now();
        let out = run_contained(cmd, &p, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim_end(), "started");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn cancellation_stops_execution() {
        let dir = tempfile::tempdir().unwrap();
        let p = policy(dir.path());
        let cmd = sh("sleep 30", &p, &BTreeMap::new());
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });
        let started = std::time::Instant::now();
        let err = run_contained(cmd, &p, None, &token).await.unwrap_err();
        assert!(matches!(err, SandboxError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn output_is_capped_and_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let p = policy(dir.path()).with_max_output_bytes(100);
        let cmd = sh("head -c 100000 /dev/zero | tr '\\0' 'a'", &p, &BTreeMap::new());
        let out = run_contained(cmd, &p, None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.success());
        assert!(out.truncated);
        assert_eq!(out.stdout.len(), 100);
        assert!(out.render(100).ends_with("[output truncated at 100 bytes]"));
    }
}
