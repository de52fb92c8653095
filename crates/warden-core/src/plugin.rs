//! Plugin definitions.
//!
//! A plugin is a user-installed capability with a declared parameter schema
//! and one of three execution strategies. Definitions are usually loaded
//! from TOML:
//!
//! ```toml
//! name = "weather"
//! description = "Current weather for a city"
//! permission_level = "YELLOW"
//!
//! [[parameters]]
//! name = "city"
//! type = "string"
//! required = true
//!
//! [execution]
//! type = "http"
//! method = "GET"
//! url = "https://api.example.com/weather/{{city}}"
//!
//! [execution.query]
//! key = "{{secret.WEATHER_KEY}}"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::action::Parameters;
use crate::tier::TrustTier;

/// Where a definition came from. Decides which execution types it may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionOrigin {
    /// Installed as a file by the operator.
    OperatorFile,
    /// Created through the conversational creation flow.
    #[default]
    Conversational,
}

/// The execution strategy a plugin declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// Outbound HTTP call.
    Http,
    /// Shell command.
    Bash,
    /// Embedded script snippet.
    Script,
}

impl ExecutionType {
    /// Stable label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Bash => "bash",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP method for [`ExecutionSpec::Http`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// GET
    #[default]
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

/// How a plugin runs. Templates use `{{param}}` and `{{secret.NAME}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionSpec {
    /// Outbound HTTP request.
    Http {
        /// Request method.
        #[serde(default)]
        method: HttpMethod,
        /// URL template.
        url: String,
        /// Query parameter templates.
        #[serde(default)]
        query: BTreeMap<String, String>,
        /// Header templates.
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// JSON body template. String leaves are rendered as templates.
        #[serde(default)]
        body: Option<serde_json::Value>,
    },
    /// Shell command template.
    Bash {
        /// Command template; substituted values are quoted.
        command: String,
    },
    /// Script source run by an interpreter.
    Script {
        /// Script source.
        source: String,
        /// Interpreter override; falls back to the sandbox default.
        #[serde(default)]
        interpreter: Option<String>,
    },
}

impl ExecutionSpec {
    /// The execution type of this spec.
    #[must_use]
    pub fn execution_type(&self) -> ExecutionType {
        match self {
            Self::Http { .. } => ExecutionType::Http,
            Self::Bash { .. } => ExecutionType::Bash,
            Self::Script { .. } => ExecutionType::Script,
        }
    }
}

/// Declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// UTF-8 string.
    String,
    /// Signed or unsigned integer.
    Integer,
    /// Any JSON number.
    Number,
    /// `true` / `false`.
    Boolean,
}

impl ParamType {
    /// Whether `value` has this type.
    #[must_use]
    pub fn matches(self, value: &serde_json::Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        };
        f.write_str(label)
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// Whether the caller must supply it.
    #[serde(default)]
    pub required: bool,
    /// Default used when the caller omits it.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Help text.
    #[serde(default)]
    pub description: String,
}

/// Parameter binding failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParameterError {
    /// A required parameter was not supplied.
    #[error("missing required parameter '{0}'")]
    Missing(String),
    /// A parameter had the wrong type.
    #[error("parameter '{name}' must be a {expected}")]
    WrongType {
        /// Parameter name.
        name: String,
        /// Declared type.
        expected: ParamType,
    },
    /// A parameter was supplied that the definition does not declare.
    #[error("unknown parameter '{0}'")]
    Unknown(String),
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// A user-installed capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDefinition {
    /// Unique plugin name.
    pub name: String,
    /// Description shown to the model and in approval prompts.
    #[serde(default)]
    pub description: String,
    /// Plugin version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Author-requested tier. Can only make classification stricter.
    #[serde(default)]
    pub permission_level: Option<TrustTier>,
    /// Declared parameters, in order.
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    /// Execution strategy.
    pub execution: ExecutionSpec,
    /// Extra environment entries for shell/script execution.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Set by the registry on install; never read from the definition file.
    #[serde(skip)]
    pub origin: DefinitionOrigin,
}

impl PluginDefinition {
    /// The declared execution type.
    #[must_use]
    pub fn execution_type(&self) -> ExecutionType {
        self.execution.execution_type()
    }

    /// Validate caller-supplied values against the declared schema.
    ///
    /// Applies defaults and returns parameters in declaration order.
    ///
    /// # Errors
    ///
    /// Returns a [`ParameterError`] for missing, mistyped, or undeclared
    /// parameters.
    pub fn bind_parameters(&self, raw: &Parameters) -> Result<Parameters, ParameterError> {
        if let Some(unknown) = raw
            .keys()
            .find(|k| !self.parameters.iter().any(|p| &p.name == *k))
        {
            return Err(ParameterError::Unknown(unknown.clone()));
        }

        let mut bound = Parameters::new();
        for spec in &self.parameters {
            let value = match (raw.get(&spec.name), &spec.default) {
                (Some(serde_json::Value::Null) | None, Some(default)) => default.clone(),
                (Some(serde_json::Value::Null) | None, None) => {
                    if spec.required {
                        return Err(ParameterError::Missing(spec.name.clone()));
                    }
                    continue;
                },
                (Some(value), _) => value.clone(),
            };
            if !spec.kind.matches(&value) {
                return Err(ParameterError::WrongType {
                    name: spec.name.clone(),
                    expected: spec.kind,
                });
            }
            bound.insert(spec.name.clone(), value);
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> PluginDefinition {
        toml::from_str(
            r#"
            name = "weather"
            permission_level = "YELLOW"

            [[parameters]]
            name = "city"
            type = "string"
            required = true

            [[parameters]]
            name = "days"
            type = "integer"
            default = 1

            [execution]
            type = "http"
            url = "https://api.example.com/weather/{{city}}"

            [execution.query]
            key = "{{secret.WEATHER_KEY}}"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn parses_toml_definition() {
        let def = definition();
        assert_eq!(def.execution_type(), ExecutionType::Http);
        assert_eq!(def.permission_level, Some(TrustTier::Yellow));
        assert_eq!(def.origin, DefinitionOrigin::Conversational);
        let ExecutionSpec::Http { method, query, .. } = &def.execution else {
            panic!("expected http");
        };
        assert_eq!(*method, HttpMethod::Get);
        assert_eq!(query.get("key").unwrap(), "{{secret.WEATHER_KEY}}");
    }

    #[test]
    fn origin_is_never_read_from_file() {
        let def: PluginDefinition = toml::from_str(
            r#"
            name = "sneaky"
            origin = "operator_file"
            [execution]
            type = "script"
            source = "print(1)"
            "#,
        )
        .unwrap();
        assert_eq!(def.origin, DefinitionOrigin::Conversational);
    }

    #[test]
    fn bind_applies_defaults_in_declaration_order() {
        let def = definition();
        let mut raw = Parameters::new();
        raw.insert("city".into(), json!("Oslo"));
        let bound = def.bind_parameters(&raw).unwrap();
        let keys: Vec<_> = bound.keys().cloned().collect();
        assert_eq!(keys, vec!["city", "days"]);
        assert_eq!(bound["days"], json!(1));
    }

    #[test]
    fn bind_rejects_missing_wrong_type_and_unknown() {
        let def = definition();
        assert_eq!(
            def.bind_parameters(&Parameters::new()),
            Err(ParameterError::Missing("city".into()))
        );

        let mut raw = Parameters::new();
        raw.insert("city".into(), json!(42));
        assert!(matches!(
            def.bind_parameters(&raw),
            Err(ParameterError::WrongType { .. })
        ));

        let mut raw = Parameters::new();
        raw.insert("city".into(), json!("Oslo"));
        raw.insert("extra".into(), json!("x"));
        assert_eq!(
            def.bind_parameters(&raw),
            Err(ParameterError::Unknown("extra".into()))
        );
    }
}
