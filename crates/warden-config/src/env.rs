//! `WARDEN_*` environment fallbacks.
//!
//! Env values only replace embedded defaults. They are merged onto the
//! defaults before any config file, so a value set in a file always wins.

use std::collections::HashMap;

use tracing::warn;

use crate::merge::set_path;

/// How an env value is converted into a TOML value.
#[derive(Debug, Clone, Copy)]
enum Kind {
    Str,
    Int,
}

/// Recognized variables and the config field each one feeds.
const ENV_FALLBACKS: &[(&str, &str, Kind)] = &[
    (
        "WARDEN_APPROVAL_TIMEOUT_SECS",
        "security.approval_timeout_secs",
        Kind::Int,
    ),
    ("WARDEN_PIN_CREDENTIAL", "security.pin.credential", Kind::Str),
    ("WARDEN_LOG_LEVEL", "logging.level", Kind::Str),
    ("WARDEN_LOG_FORMAT", "logging.format", Kind::Str),
    ("WARDEN_AUDIT_PATH", "audit.path", Kind::Str),
    ("WARDEN_PLUGINS_DIR", "plugins.dir", Kind::Str),
    ("WARDEN_SANDBOX_DIR", "sandbox.work_dir", Kind::Str),
];

/// Snapshot the `WARDEN_*` variables of the current process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("WARDEN_"))
        .collect()
}

/// Write recognized env values into `target`. Returns how many applied.
pub fn apply_env_fallbacks(target: &mut toml::Value, env: &HashMap<String, String>) -> usize {
    let mut applied: usize = 0;
    for (var, path, kind) in ENV_FALLBACKS {
        let Some(raw) = env.get(*var) else {
            continue;
        };
        let value = match kind {
            Kind::Str => toml::Value::String(raw.clone()),
            Kind::Int => match raw.trim().parse::<i64>() {
                Ok(n) => toml::Value::Integer(n),
                Err(_) => {
                    warn!(var = *var, "Ignoring non-numeric environment value");
                    continue;
                },
            },
        };
        set_path(target, path, value);
        applied = applied.saturating_add(1);
    }
    applied
}
