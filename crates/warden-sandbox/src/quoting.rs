//! Argument quoting for the host shell.
//!
//! Both rule sets are plain string functions available on every platform;
//! [`Quoting::host`] picks the one matching the shell [`shell_command`]
//! launches.
//!
//! [`shell_command`]: crate::shell::shell_command

/// Quoting rules of a command interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quoting {
    /// POSIX `sh`: single quotes.
    Posix,
    /// Windows `cmd.exe`: double quotes plus `^` escapes.
    Cmd,
}

impl Quoting {
    /// Rules for the shell used on this platform.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) { Self::Cmd } else { Self::Posix }
    }

    /// Quote `value` as exactly one argument.
    #[must_use]
    pub fn quote(self, value: &str) -> String {
        match self {
            Self::Posix => posix_quote(value),
            Self::Cmd => cmd_quote(value),
        }
    }
}

/// Wrap in single quotes; an embedded `'` becomes `'\''`.
#[must_use]
pub fn posix_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len().saturating_add(2));
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}

/// Characters `cmd.exe` interprets even inside a quoted argument.
const CMD_METACHARACTERS: &[char] = &['&', '|', '<', '>', '^', '(', ')', '%', '!', '"'];

/// Wrap in double quotes and `^`-escape every metacharacter.
#[must_use]
pub fn cmd_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len().saturating_mul(2).saturating_add(2));
    out.push('"');
    for c in value.chars() {
        if CMD_METACHARACTERS.contains(&c) {
            out.push('^');
        }
        // Line breaks end a cmd.exe command.
        if c == '\r' || c == '\n' {
            out.push(' ');
            continue;
        }
        out.push(c);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_quotes_metacharacters() {
        assert_eq!(posix_quote("; rm -rf /"), "'; rm -rf /'");
        assert_eq!(posix_quote("$(id) `id` $HOME"), "'$(id) `id` $HOME'");
        assert_eq!(posix_quote(""), "''");
    }

    #[test]
    fn posix_escapes_single_quote() {
        assert_eq!(posix_quote("it's"), "'it'\\''s'");
        assert_eq!(posix_quote("'; rm -rf / #"), "''\\''; rm -rf / #'");
    }

    #[test]
    fn cmd_escapes_metacharacters() {
        assert_eq!(cmd_quote("&& calc.exe"), "\"^&^& calc.exe\"");
        assert_eq!(cmd_quote("a|b<c>d"), "\"a^|b^<c^>d\"");
        assert_eq!(cmd_quote("%PATH%!x!"), "\"^%PATH^%^!x^!\"");
        assert_eq!(cmd_quote("say \"hi\""), "\"say ^\"hi^\"\"");
        assert_eq!(cmd_quote("a\r\nb"), "\"a  b\"");
    }

    #[test]
    fn host_matches_platform() {
        if cfg!(windows) {
            assert_eq!(Quoting::host(), Quoting::Cmd);
        } else {
            assert_eq!(Quoting::host(), Quoting::Posix);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn quoted_value_stays_one_argument() {
        for hostile in ["; echo pwned", "&& echo pwned", "$(echo pwned)", "a' ; echo pwned '"] {
            let script = format!("printf '%s' {}", posix_quote(hostile));
            let out = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&script)
                .output()
                .await
                .unwrap();
            assert_eq!(String::from_utf8_lossy(&out.stdout), hostile);
        }
    }
}
