//! Post-merge configuration validation.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, ProcessLimitsConfig, WindowConfig};

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_security(config)?;
    validate_rate_limits(config)?;
    validate_sandbox(config)?;
    validate_logging(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_security(config: &Config) -> ConfigResult<()> {
    let s = &config.security;
    if s.approval_timeout_secs == 0 {
        return Err(invalid(
            "security.approval_timeout_secs",
            "must be greater than zero",
        ));
    }
    if s.pin.max_failures == 0 {
        return Err(invalid("security.pin.max_failures", "must be at least 1"));
    }
    if s.pin.lockout_secs == 0 {
        return Err(invalid("security.pin.lockout_secs", "must be greater than zero"));
    }
    if let Some(credential) = &s.pin.credential
        && !is_credential_shape(credential)
    {
        return Err(invalid(
            "security.pin.credential",
            "expected 'blake3$<salt hex>$<hash hex>'",
        ));
    }
    for pattern in &s.classifier.extra_destructive_patterns {
        if let Err(e) = regex::Regex::new(pattern) {
            return Err(invalid(
                "security.classifier.extra_destructive_patterns",
                format!("pattern '{pattern}' does not compile: {e}"),
            ));
        }
    }
    Ok(())
}

/// Structural check only; the approval crate does the real decode.
fn is_credential_shape(s: &str) -> bool {
    let mut parts = s.split('$');
    let (Some(scheme), Some(salt), Some(hash), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let is_hex = |p: &str| {
        !p.is_empty() && p.len().is_multiple_of(2) && p.bytes().all(|b| b.is_ascii_hexdigit())
    };
    scheme == "blake3" && is_hex(salt) && hash.len() == 64 && is_hex(hash)
}

fn validate_rate_limits(config: &Config) -> ConfigResult<()> {
    let r = &config.rate_limits;
    if r.max_keys == 0 {
        return Err(invalid("rate_limits.max_keys", "must be greater than zero"));
    }
    check_window("rate_limits.auth", r.auth)?;
    check_window("rate_limits.plugin_execution", r.plugin_execution)?;
    check_window("rate_limits.api", r.api)?;
    Ok(())
}

fn check_window(field: &str, window: WindowConfig) -> ConfigResult<()> {
    if window.window_secs == 0 {
        return Err(invalid(
            &format!("{field}.window_secs"),
            "must be greater than zero",
        ));
    }
    if window.max_requests == 0 {
        return Err(invalid(
            &format!("{field}.max_requests"),
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_sandbox(config: &Config) -> ConfigResult<()> {
    let s = &config.sandbox;
    check_limits("sandbox.shell", &s.shell)?;
    check_limits("sandbox.script", &s.script)?;
    if s.script_interpreter.trim().is_empty() {
        return Err(invalid("sandbox.script_interpreter", "must not be empty"));
    }
    if s.http.timeout_secs == 0 {
        return Err(invalid("sandbox.http.timeout_secs", "must be greater than zero"));
    }
    if s.http.max_response_bytes == 0 {
        return Err(invalid(
            "sandbox.http.max_response_bytes",
            "must be greater than zero",
        ));
    }
    Ok(())
}

fn check_limits(field: &str, limits: &ProcessLimitsConfig) -> ConfigResult<()> {
    if limits.timeout_secs == 0 {
        return Err(invalid(
            &format!("{field}.timeout_secs"),
            "must be greater than zero",
        ));
    }
    if limits.max_output_bytes == 0 {
        return Err(invalid(
            &format!("{field}.max_output_bytes"),
            "must be greater than zero",
        ));
    }
    if limits.max_memory_bytes == Some(0) {
        return Err(invalid(
            &format!("{field}.max_memory_bytes"),
            "must be greater than zero when set",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.to_ascii_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        return Err(invalid(
            "logging.level",
            format!("unknown level '{}'", l.level),
        ));
    }
    if !matches!(
        l.format.to_ascii_lowercase().as_str(),
        "pretty" | "compact" | "full" | "json"
    ) {
        return Err(invalid(
            "logging.format",
            format!("unknown format '{}'; expected pretty, compact, full or json", l.format),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn zero_timeout_rejected() {
        let mut config = Config::default();
        config.security.approval_timeout_secs = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("security.approval_timeout_secs"));
    }

    #[test]
    fn bad_pattern_rejected() {
        let mut config = Config::default();
        config
            .security
            .classifier
            .extra_destructive_patterns
            .push("(unclosed".into());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn credential_shape() {
        let hash = "ab".repeat(32);
        assert!(is_credential_shape(&format!("blake3$0011${hash}")));
        assert!(!is_credential_shape("plaintext-pin"));
        assert!(!is_credential_shape(&format!("sha1$0011${hash}")));
        assert!(!is_credential_shape("blake3$zz$00"));
    }

    #[test]
    fn zero_max_failures_rejected() {
        let mut config = Config::default();
        config.security.pin.max_failures = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".into();
        assert!(validate(&config).is_err());
    }
}
