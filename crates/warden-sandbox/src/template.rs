//! Single-pass placeholder rendering.
//!
//! `{{NAME}}` resolves from the bound parameters and `{{secret.NAME}}`
//! from the [`Secrets`] store. Substituted text is never scanned again, so
//! a parameter whose value contains `{{secret.X}}` stays literal.
//!
//! Every substituted value passes through an [`Escape`] chosen by the
//! caller: URL components are percent-encoded, shell arguments are quoted.
//! Unbound parameters render as an empty value; unknown secrets are an
//! error.

use serde_json::Value;
use url::form_urlencoded;
use warden_core::Parameters;

use crate::error::{SandboxError, SandboxResult};
use crate::quoting::Quoting;
use crate::secrets::Secrets;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const SECRET_PREFIX: &str = "secret.";

/// How substituted values are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// Inserted verbatim (headers, query values, JSON body strings).
    None,
    /// Percent-encoded for use inside a URL.
    UrlComponent,
    /// Quoted as one shell argument.
    Shell(Quoting),
}

impl Escape {
    fn apply(self, raw: &str) -> String {
        match self {
            Self::None => raw.to_string(),
            Self::UrlComponent => percent_encode(raw),
            Self::Shell(quoting) => quoting.quote(raw),
        }
    }
}

/// Render `template`.
///
/// # Errors
///
/// Returns [`SandboxError::Template`] if a referenced secret is missing.
pub fn render(
    template: &str,
    params: &Parameters,
    secrets: &Secrets,
    escape: Escape,
) -> SandboxResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(OPEN) {
        let (literal, tail) = rest.split_at(start);
        out.push_str(literal);
        let after_open = &tail[OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            out.push_str(tail);
            return Ok(out);
        };
        let name = after_open[..end].trim();
        let raw = resolve(name, params, secrets)?;
        out.push_str(&escape.apply(&raw));
        rest = &after_open[end.saturating_add(CLOSE.len())..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Render every string leaf of a JSON template without escaping.
///
/// # Errors
///
/// Returns [`SandboxError::Template`] if a referenced secret is missing.
pub fn render_json(template: &Value, params: &Parameters, secrets: &Secrets) -> SandboxResult<Value> {
    Ok(match template {
        Value::String(s) => Value::String(render(s, params, secrets, Escape::None)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| render_json(v, params, secrets))
                .collect::<SandboxResult<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), render_json(v, params, secrets)?)))
                .collect::<SandboxResult<_>>()?,
        ),
        other => other.clone(),
    })
}

fn resolve(name: &str, params: &Parameters, secrets: &Secrets) -> SandboxResult<String> {
    if let Some(key) = name.strip_prefix(SECRET_PREFIX) {
        return secrets
            .get(key)
            .ok_or_else(|| SandboxError::Template(format!("secret not found: {key}")));
    }
    Ok(params.get(name).map(value_text).unwrap_or_default())
}

/// Text form of a parameter value.
#[must_use]
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn percent_encode(raw: &str) -> String {
    // form encoding uses '+' for space and escapes a literal '+' as %2B.
    form_urlencoded::byte_serialize(raw.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
