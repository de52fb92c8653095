//! Bridge from `warden_config::Config` to domain types.
//!
//! The config crate depends on no other warden crate, so every conversion
//! into approval, sandbox, audit and telemetry types happens here, once.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;
use warden_approval::{
    PinCredential, PinVerifier, RateLimiterConfig, RateWindow, TrustClassifier,
};
use warden_audit::AuditLog;
use warden_config::{Config, ProcessLimitsConfig, WindowConfig};
use warden_core::SandboxPolicy;
use warden_sandbox::{ExecutorConfig, HttpPolicy, Secrets};
use warden_telemetry::{LogConfig, LogFormat, LogTarget};

use crate::error::RuntimeResult;

/// Prefix of the daily log files.
const LOG_FILE_PREFIX: &str = "warden.log";

/// Approval timeout.
#[must_use]
pub fn to_approval_timeout(cfg: &Config) -> Duration {
    Duration::from_secs(cfg.security.approval_timeout_secs)
}

/// Convert the `[rate_limits]` section.
#[must_use]
pub fn to_rate_limiter_config(cfg: &Config) -> RateLimiterConfig {
    let window = |w: &WindowConfig| RateWindow::new(Duration::from_secs(w.window_secs), w.max_requests);
    RateLimiterConfig {
        max_keys: cfg.rate_limits.max_keys,
        auth: window(&cfg.rate_limits.auth),
        plugin_execution: window(&cfg.rate_limits.plugin_execution),
        api: window(&cfg.rate_limits.api),
    }
}

/// Build the PIN verifier. Without a credential every RED approval is
/// refused.
///
/// # Errors
///
/// Returns an error if the stored credential does not parse.
pub fn to_pin_verifier(cfg: &Config) -> RuntimeResult<PinVerifier> {
    let pin = &cfg.security.pin;
    let credential = pin
        .credential
        .as_deref()
        .map(PinCredential::parse)
        .transpose()?;
    if credential.is_none() {
        warn!("No PIN credential configured; RED actions cannot be approved");
    }
    Ok(PinVerifier::new(
        credential,
        pin.max_failures,
        Duration::from_secs(pin.lockout_secs),
    ))
}

/// Build the classifier with the operator's list additions.
///
/// # Errors
///
/// Returns an error if an extra destructive pattern does not compile.
pub fn to_classifier(cfg: &Config) -> RuntimeResult<TrustClassifier> {
    let c = &cfg.security.classifier;
    let classifier = TrustClassifier::new()
        .with_read_only_tools(c.read_only_tools.iter().cloned())
        .with_mutating_tools(c.mutating_tools.iter().cloned())
        .with_dangerous_key_combos(c.dangerous_key_combos.iter().cloned())
        .with_destructive_patterns(c.extra_destructive_patterns.iter().cloned())?;
    Ok(classifier)
}

/// The sandbox work directory.
#[must_use]
pub fn to_work_dir(cfg: &Config) -> PathBuf {
    cfg.sandbox
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("warden-sandbox"))
}

fn to_policy(cfg: &Config, work_dir: &Path, limits: &ProcessLimitsConfig) -> SandboxPolicy {
    let mut policy = SandboxPolicy::new(work_dir)
        .with_timeout(Duration::from_secs(limits.timeout_secs))
        .with_max_memory_bytes(limits.max_memory_bytes)
        .with_max_output_bytes(limits.max_output_bytes);
    policy.allowed_env.clone_from(&cfg.sandbox.allowed_env);
    policy
}

/// Convert the `[sandbox]` section.
#[must_use]
pub fn to_executor_config(cfg: &Config) -> ExecutorConfig {
    let work_dir = to_work_dir(cfg);
    let http = &cfg.sandbox.http;
    ExecutorConfig {
        shell: to_policy(cfg, &work_dir, &cfg.sandbox.shell),
        script: to_policy(cfg, &work_dir, &cfg.sandbox.script),
        http: HttpPolicy {
            timeout: Duration::from_secs(http.timeout_secs),
            max_response_bytes: http.max_response_bytes,
            allow_private_networks: http.allow_private_networks,
            extra_blocked_hosts: http.extra_blocked_hosts.clone(),
        },
        install_dir: cfg.sandbox.install_dir.clone(),
        fallback_dir: std::env::temp_dir().join("warden-sandbox"),
        script_interpreter: cfg.sandbox.script_interpreter.clone(),
    }
}

/// Load the secret store named in `[plugins]`.
///
/// A configured file that does not exist yields an empty store.
///
/// # Errors
///
/// Returns an error if the file exists but is unreadable, malformed, or
/// accessible to other users.
pub fn to_secrets(cfg: &Config) -> RuntimeResult<Secrets> {
    match &cfg.plugins.secrets_file {
        Some(path) if path.exists() => Ok(Secrets::load(path)?),
        Some(path) => {
            warn!(path = %path.display(), "Secrets file not found; using an empty store");
            Ok(Secrets::new())
        },
        None => Ok(Secrets::new()),
    }
}

/// Open the audit log. `home` supplies the default location.
///
/// # Errors
///
/// Returns an error if the audit file cannot be opened.
pub fn to_audit_log(cfg: &Config, home: &Path) -> RuntimeResult<AuditLog> {
    if !cfg.audit.enabled {
        warn!("Audit log disabled by configuration");
        return Ok(AuditLog::disabled());
    }
    let path = cfg
        .audit
        .path
        .clone()
        .unwrap_or_else(|| home.join("audit.jsonl"));
    Ok(AuditLog::open(path)?)
}

/// Convert the `[logging]` section.
///
/// # Errors
///
/// Returns an error for an unknown format name.
pub fn to_log_config(cfg: &Config) -> RuntimeResult<LogConfig> {
    let logging = &cfg.logging;
    let format: LogFormat = logging.format.parse()?;
    let target = match &logging.file_dir {
        Some(dir) => LogTarget::File {
            directory: dir.clone(),
            prefix: LOG_FILE_PREFIX.to_string(),
        },
        None => LogTarget::Stderr,
    };
    let mut log = LogConfig::new(&logging.level)
        .with_format(format)
        .with_target(target);
    for directive in &logging.directives {
        log = log.with_directive(directive);
    }
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{ActionKind, Parameters, TrustTier};

    fn config(src: &str) -> Config {
        toml::from_str(src).unwrap()
    }

    #[test]
    fn rate_limits_convert() {
        let cfg = config("[rate_limits.api]\nwindow_secs = 10\nmax_requests = 3\n");
        let limits = to_rate_limiter_config(&cfg);
        assert_eq!(limits.api, RateWindow::new(Duration::from_secs(10), 3));
        assert_eq!(limits.max_keys, 10_000);
    }

    #[test]
    fn classifier_extras_apply() {
        let cfg = config(
            r#"
            [security.classifier]
            read_only_tools = ["fetch_docs"]
            extra_destructive_patterns = ["(?i)drop\\s+table"]
            "#,
        );
        let classifier = to_classifier(&cfg).unwrap();
        let verdict = classifier.classify(&ActionKind::builtin("fetch_docs"), &Parameters::new(), None);
        assert_eq!(verdict.tier, TrustTier::Green);

        let mut params = Parameters::new();
        params.insert("sql".into(), "DROP TABLE users".into());
        let verdict = classifier.classify(&ActionKind::builtin("fetch_docs"), &params, None);
        assert_eq!(verdict.tier, TrustTier::Red);
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let cfg = config("[security.classifier]\nextra_destructive_patterns = [\"(\"]\n");
        assert!(to_classifier(&cfg).is_err());
    }

    #[test]
    fn pin_credential_round_trips() {
        let encoded = PinCredential::derive("1357").encode();
        let cfg = config(&format!("[security.pin]\ncredential = \"{encoded}\"\n"));
        let verifier = to_pin_verifier(&cfg).unwrap();
        assert!(verifier.is_configured());
        assert!(verifier.verify("1357").is_ok());

        assert!(!to_pin_verifier(&Config::default()).unwrap().is_configured());
    }

    #[test]
    fn sandbox_section_converts() {
        let cfg = config(
            r#"
            [sandbox]
            work_dir = "/srv/warden/work"
            allowed_env = ["PATH"]

            [sandbox.shell]
            timeout_secs = 5
            max_output_bytes = 1024

            [sandbox.http]
            allow_private_networks = true
            "#,
        );
        let exec = to_executor_config(&cfg);
        assert_eq!(exec.shell.work_dir, PathBuf::from("/srv/warden/work"));
        assert_eq!(exec.shell.timeout, Duration::from_secs(5));
        assert_eq!(exec.shell.max_output_bytes, 1024);
        assert_eq!(exec.shell.allowed_env, vec!["PATH".to_string()]);
        assert_eq!(exec.script.timeout, Duration::from_secs(60));
        assert!(exec.http.allow_private_networks);
        assert_eq!(exec.script_interpreter, "python3");
    }

    #[test]
    fn logging_converts() {
        let cfg = config("[logging]\nlevel = \"debug\"\nformat = \"json\"\ndirectives = [\"warden_sandbox=trace\"]\n");
        let log = to_log_config(&cfg).unwrap();
        assert_eq!(log.level, "debug");
        assert_eq!(log.format, LogFormat::Json);
        assert_eq!(log.target, LogTarget::Stderr);
        assert_eq!(log.directives, vec!["warden_sandbox=trace".to_string()]);

        let cfg = config("[logging]\nformat = \"fancy\"\n");
        assert!(to_log_config(&cfg).is_err());
    }

    #[test]
    fn audit_defaults_to_home() {
        let home = tempfile::tempdir().unwrap();
        let log = to_audit_log(&Config::default(), home.path()).unwrap();
        drop(log);
        assert!(home.path().join("audit.jsonl").exists());
    }
}
