//! Trust classification.
//!
//! [`TrustClassifier::classify`] is pure and deterministic. Rules, in order:
//!
//! 1. Built-in tools on the read-only list are GREEN, tools on the mutating
//!    list are YELLOW, and any other built-in is RED (fail-closed).
//! 2. Computer actions get the COMPUTER tier with a band: read-only,
//!    moderate, or destructive. Unknown sub-actions are destructive.
//! 3. Plugins start at YELLOW.
//! 4. Any string parameter (searched recursively) matching a destructive
//!    pattern forces RED, or the destructive band for computer actions.
//! 5. A declared permission level can only make the result stricter.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use warden_core::{
    ActionKind, Classification, ComputerBand, ExecutionSpec, Parameters, PluginDefinition,
    TrustTier,
};

use crate::error::{ApprovalError, ApprovalResult};

/// Built-in tools that only read.
pub const READ_ONLY_TOOLS: &[&str] = &["read_file", "list_directory", "glob", "grep", "search"];

/// Built-in tools that mutate state.
pub const MUTATING_TOOLS: &[&str] = &["write_file", "edit_file", "bash", "shell"];

/// Computer sub-actions that only observe or move the pointer.
const COMPUTER_READ_ONLY: &[&str] = &["screenshot", "cursor_position", "mouse_move"];

/// Computer sub-actions that need approval.
const COMPUTER_MODERATE: &[&str] = &[
    "click",
    "left_click",
    "right_click",
    "middle_click",
    "double_click",
    "type",
    "key",
    "scroll",
];

/// Computer sub-actions that need approval and an elevated warning.
const COMPUTER_DESTRUCTIVE: &[&str] = &["left_click_drag", "hold_key", "triple_click"];

/// Key combinations that force-quit, log out or reach the security screen.
const DANGEROUS_KEY_COMBOS: &[&str] = &[
    "ctrl+alt+delete",
    "ctrl+alt+del",
    "cmd+option+esc",
    "alt+f4",
    "cmd+q",
    "ctrl+shift+esc",
];

/// Destructive command patterns with a short label for the approval prompt.
static DESTRUCTIVE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"(?i)\brm\s+(?:-{1,2}[a-z-]*\s+)*(?:-[a-z]*r[a-z]*|--recursive)\b",
            "recursive delete",
        ),
        (r"(?i)\b(?:rmdir|rd|del)\s+/s\b", "recursive delete"),
        (r"(?i)\bremove-item\b.*-recurse\b", "recursive delete"),
        (
            r"(?i)\bgit\s+push\b.*(?:\s--force(?:-with-lease)?\b|\s-[a-z]*f[a-z]*\b)",
            "forced push",
        ),
        (
            r"(?i)(?:^|[;&|(`]|\$\()\s*(?:sudo|su|doas|pkexec|runas)\b",
            "privilege elevation",
        ),
        (
            r"(?i)\b(?:mkfs(?:\.\w+)?|fdisk|sfdisk|parted|wipefs|diskpart)\b",
            "disk formatting",
        ),
        (r"(?i)\bdd\b.*\bof=/dev/", "raw disk write"),
        (r"(?i)\bformat\s+[a-z]:", "disk formatting"),
        (r">\s*/dev/(?:sd|nvme|hd|disk)", "raw disk write"),
        (
            r"(?i)\b(?:curl|wget|fetch|iwr|invoke-webrequest)\b[^|]*\|\s*(?:sudo\s+)?(?:(?:ba|z|k|da)?sh|python\d?|perl|ruby|node|iex)\b",
            "pipe to shell",
        ),
        (r"(?i)(?:^|[;&|(\s])(?:eval|exec)\s", "code evaluation"),
        (r"(?i)\bpython\d?(?:\.\d+)?\s+-c\b", "code evaluation"),
        (r"(?i)\b(?:node|deno)\s+(?:-e|--eval)\b", "code evaluation"),
        (r"(?i)\b(?:perl|ruby)\s+-e\b", "code evaluation"),
        (r"(?i)\bbase64\s+(?:-d|--decode)\b.*\|", "decoded payload execution"),
        (r"(?i)\b(?:iex|invoke-expression)\b", "code evaluation"),
        (r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:", "fork bomb"),
        (
            r"(?i)\bchmod\s+(?:-[a-z]*r[a-z]*\s+)0?777\s+/(?:\s|$)",
            "recursive world-writable root",
        ),
        (
            r"(?i)(?:^|[;&|(\s])(?:shutdown|reboot|halt|poweroff)\b",
            "host shutdown",
        ),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("invalid regex"), label))
    .collect()
});

/// Maps actions to trust tiers.
#[derive(Debug, Clone)]
pub struct TrustClassifier {
    read_only: HashSet<String>,
    mutating: HashSet<String>,
    extra_patterns: Vec<Regex>,
    dangerous_combos: Vec<BTreeSet<String>>,
}

impl TrustClassifier {
    /// Classifier with the built-in lists only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_only: READ_ONLY_TOOLS.iter().map(ToString::to_string).collect(),
            mutating: MUTATING_TOOLS.iter().map(ToString::to_string).collect(),
            extra_patterns: Vec::new(),
            dangerous_combos: DANGEROUS_KEY_COMBOS
                .iter()
                .map(|c| normalize_combo(c))
                .collect(),
        }
    }

    /// Add read-only tool names.
    #[must_use]
    pub fn with_read_only_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_only.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Add mutating tool names.
    #[must_use]
    pub fn with_mutating_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutating.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Add dangerous key combinations.
    #[must_use]
    pub fn with_dangerous_key_combos<I, S>(mut self, combos: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dangerous_combos
            .extend(combos.into_iter().map(|c| normalize_combo(c.as_ref())));
        self
    }

    /// Add destructive patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidPattern`] if a pattern does not compile.
    pub fn with_destructive_patterns<I, S>(mut self, patterns: I) -> ApprovalResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let regex = Regex::new(pattern).map_err(|e| ApprovalError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
            self.extra_patterns.push(regex);
        }
        Ok(self)
    }

    /// Classify an action.
    #[must_use]
    pub fn classify(
        &self,
        kind: &ActionKind,
        parameters: &Parameters,
        declared: Option<TrustTier>,
    ) -> Classification {
        let destructive = parameters
            .values()
            .find_map(|value| self.scan_value(value));
        self.finish(kind, parameters, destructive, declared)
    }

    /// Classify a plugin invocation.
    ///
    /// The definition's templates (command, URL, body, script source) are
    /// scanned along with the parameters, and the definition's declared
    /// permission level applies.
    #[must_use]
    pub fn classify_plugin(
        &self,
        definition: &PluginDefinition,
        parameters: &Parameters,
    ) -> Classification {
        let kind = ActionKind::plugin(&definition.name, definition.execution_type());
        let destructive = parameters
            .values()
            .find_map(|value| self.scan_value(value))
            .or_else(|| self.scan_template(&definition.execution));
        self.finish(
            &kind,
            parameters,
            destructive,
            definition.permission_level,
        )
    }

    /// Label of the first destructive pattern matching `text`, if any.
    #[must_use]
    pub fn destructive_match(&self, text: &str) -> Option<&'static str> {
        let builtin = DESTRUCTIVE_PATTERNS
            .iter()
            .find_map(|(re, label)| re.is_match(text).then_some(*label));
        if builtin.is_some() {
            return builtin;
        }
        self.extra_patterns
            .iter()
            .any(|re| re.is_match(text))
            .then_some("operator-defined destructive pattern")
    }

    fn finish(
        &self,
        kind: &ActionKind,
        parameters: &Parameters,
        destructive: Option<&'static str>,
        declared: Option<TrustTier>,
    ) -> Classification {
        let base = match kind {
            ActionKind::Computer { action } => {
                return self.classify_computer(action, parameters, destructive, declared);
            },
            ActionKind::Builtin { name } => self.classify_builtin(name),
            ActionKind::Plugin { name, .. } => {
                Classification::new(TrustTier::Yellow, format!("plugin '{name}'"))
            },
        };

        let base = match destructive {
            Some(label) => Classification::new(
                TrustTier::Red,
                format!("destructive pattern: {label}"),
            ),
            None => base,
        };
        apply_declared(base, declared)
    }

    fn classify_builtin(&self, name: &str) -> Classification {
        if self.read_only.contains(name) {
            Classification::new(TrustTier::Green, format!("read-only tool '{name}'"))
        } else if self.mutating.contains(name) {
            Classification::new(TrustTier::Yellow, format!("mutating tool '{name}'"))
        } else {
            Classification::new(TrustTier::Red, format!("unknown action '{name}'"))
        }
    }

    fn classify_computer(
        &self,
        action: &str,
        parameters: &Parameters,
        destructive: Option<&'static str>,
        declared: Option<TrustTier>,
    ) -> Classification {
        let action = action.to_ascii_lowercase();
        let base = if COMPUTER_DESTRUCTIVE.contains(&action.as_str()) {
            Classification::computer(
                ComputerBand::Destructive,
                format!("compound input action '{action}'"),
            )
        } else if let Some(combo) = self.dangerous_combo_in(parameters) {
            Classification::computer(
                ComputerBand::Destructive,
                format!("dangerous key combination '{combo}'"),
            )
        } else if let Some(label) = destructive {
            Classification::computer(
                ComputerBand::Destructive,
                format!("destructive pattern in input: {label}"),
            )
        } else if COMPUTER_READ_ONLY.contains(&action.as_str()) {
            Classification::computer(ComputerBand::ReadOnly, format!("observation '{action}'"))
        } else if COMPUTER_MODERATE.contains(&action.as_str()) {
            Classification::computer(ComputerBand::Moderate, format!("input action '{action}'"))
        } else {
            Classification::computer(
                ComputerBand::Destructive,
                format!("unknown computer action '{action}'"),
            )
        };
        apply_declared(base, declared)
    }

    fn dangerous_combo_in(&self, parameters: &Parameters) -> Option<String> {
        ["key", "text", "keys"]
            .iter()
            .filter_map(|name| parameters.get(*name).and_then(Value::as_str))
            .find(|value| {
                let combo = normalize_combo(value);
                self.dangerous_combos.iter().any(|d| *d == combo)
            })
            .map(str::to_string)
    }

    fn scan_value(&self, value: &Value) -> Option<&'static str> {
        match value {
            Value::String(s) => self.destructive_match(s),
            Value::Array(items) => items.iter().find_map(|v| self.scan_value(v)),
            Value::Object(map) => map.values().find_map(|v| self.scan_value(v)),
            _ => None,
        }
    }

    fn scan_template(&self, spec: &ExecutionSpec) -> Option<&'static str> {
        match spec {
            ExecutionSpec::Bash { command } => self.destructive_match(command),
            ExecutionSpec::Script { source, .. } => self.destructive_match(source),
            ExecutionSpec::Http {
                url, query, body, ..
            } => self
                .destructive_match(url)
                .or_else(|| query.values().find_map(|v| self.destructive_match(v)))
                .or_else(|| body.as_ref().and_then(|b| self.scan_value(b))),
        }
    }
}

impl Default for TrustClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_declared(base: Classification, declared: Option<TrustTier>) -> Classification {
    match declared {
        Some(level) if level.stricter(base.tier) == level && level != base.tier => {
            let band = (level == TrustTier::Computer).then_some(ComputerBand::Moderate);
            Classification {
                tier: level,
                band,
                reason: format!("{} (raised by declared level {level})", base.reason),
            }
        },
        _ => base,
    }
}

/// Lower-case, alias and order-normalize a key combination.
fn normalize_combo(combo: &str) -> BTreeSet<String> {
    combo
        .split(['+', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let lower = part.to_ascii_lowercase();
            match lower.as_str() {
                "control" => "ctrl".to_string(),
                "command" | "super" | "meta" | "win" | "windows" => "cmd".to_string(),
                "option" | "opt" => "alt".to_string(),
                "escape" => "esc".to_string(),
                "del" => "delete".to_string(),
                _ => lower,
            }
        })
        .collect()
}
