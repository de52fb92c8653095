//! Environment variable policy for sandboxed child processes.
//!
//! Two lists live here:
//!
//! - [`DEFAULT_INHERITED_ENV`]: the only host variables a sandboxed process
//!   may inherit. Everything else in the host environment is dropped.
//! - The spawn blocklist: variables a plugin definition may never set,
//!   because they inject code or libraries, redirect trust anchors, or
//!   override the inherited system variables.
//!
//! All enforcement points MUST use this module rather than keeping their own
//! inline lists.

/// Host variables inherited by sandboxed processes.
pub const DEFAULT_INHERITED_ENV: &[&str] = &[
    // POSIX essentials
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TERM",
    // Temporary directories
    "TMPDIR",
    "TMP",
    "TEMP",
    // Windows essentials
    "SYSTEMROOT",
    "WINDIR",
    "COMSPEC",
    "PATHEXT",
    "USERPROFILE",
];

/// Env vars that must never be set by plugin definitions.
const BLOCKED_SPAWN_ENV: &[&str] = &[
    // Core execution environment
    "HOME",
    "PATH",
    "WARDEN_HOME",
    // Library injection (Linux)
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    // Library injection (macOS)
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "DYLD_FRAMEWORK_PATH",
    // Node.js execution control
    "NODE_OPTIONS",
    "NODE_PATH",
    // Python code injection
    "PYTHONPATH",
    "PYTHONSTARTUP",
    // Perl/Ruby code injection
    "PERL5LIB",
    "RUBYLIB",
    // Shell startup injection
    "BASH_ENV",
    "ENV",
    "IFS",
    // Java agent injection
    "JAVA_TOOL_OPTIONS",
    "_JAVA_OPTIONS",
    "JDK_JAVA_OPTIONS",
    // TLS/CA trust injection (MITM)
    "NODE_EXTRA_CA_CERTS",
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    // OpenSSL engine loading
    "OPENSSL_CONF",
    // Temp directory redirection
    "TMPDIR",
    "TEMP",
    "TMP",
    // Traffic interception via proxy
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "NO_PROXY",
    // Windows interpreter hijack
    "COMSPEC",
    "PATHEXT",
    "SYSTEMROOT",
];

/// Prefixes that are blocked entirely (case-insensitive).
const BLOCKED_PREFIXES: &[&str] = &[
    "ld_",         // Linux dynamic linker
    "dyld_",       // macOS dynamic linker
    "npm_config_", // npm configuration override
];

/// Returns `true` if `key` must not be set by a plugin definition.
///
/// Checks both exact matches (case-insensitive) and blocked prefixes.
#[must_use]
pub fn is_blocked_spawn_env(key: &str) -> bool {
    if BLOCKED_SPAWN_ENV
        .iter()
        .any(|k| k.eq_ignore_ascii_case(key))
    {
        return true;
    }
    let lower = key.to_ascii_lowercase();
    BLOCKED_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// Collect the allow-listed variables that are set in the host environment.
///
/// Names are matched exactly; unset variables are skipped.
#[must_use]
pub fn inherited_env(allowed: &[String]) -> Vec<(String, String)> {
    allowed
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|value| (name.clone(), value)))
        .collect()
}
