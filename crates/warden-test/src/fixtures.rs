//! Test fixtures for common types.

use std::collections::BTreeMap;

use warden_core::{
    DefinitionOrigin, ExecutionSpec, HttpMethod, ParamSpec, ParamType, Parameters,
    PluginDefinition, RequesterId,
};

/// The requester used by most tests.
#[must_use]
pub fn test_requester() -> RequesterId {
    RequesterId::new("test-session")
}

/// Build string parameters from pairs, in order.
#[must_use]
pub fn params(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
        .collect()
}

/// A required string parameter.
#[must_use]
pub fn string_param(name: &str) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        kind: ParamType::String,
        required: true,
        default: None,
        description: String::new(),
    }
}

fn definition(name: &str, parameters: &[&str], execution: ExecutionSpec) -> PluginDefinition {
    PluginDefinition {
        name: name.to_string(),
        description: format!("{name} test plugin"),
        version: "0.1.0".to_string(),
        permission_level: None,
        parameters: parameters.iter().map(|p| string_param(p)).collect(),
        execution,
        env: BTreeMap::new(),
        origin: DefinitionOrigin::Conversational,
    }
}

/// A GET plugin for `url` taking required string `parameters`.
#[must_use]
pub fn http_plugin(name: &str, url: &str, parameters: &[&str]) -> PluginDefinition {
    definition(
        name,
        parameters,
        ExecutionSpec::Http {
            method: HttpMethod::Get,
            url: url.to_string(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        },
    )
}

/// A shell plugin running `command` with required string `parameters`.
#[must_use]
pub fn bash_plugin(name: &str, command: &str, parameters: &[&str]) -> PluginDefinition {
    definition(
        name,
        parameters,
        ExecutionSpec::Bash {
            command: command.to_string(),
        },
    )
}

/// A script plugin run by `interpreter`.
#[must_use]
pub fn script_plugin(name: &str, source: &str, interpreter: &str) -> PluginDefinition {
    definition(
        name,
        &[],
        ExecutionSpec::Script {
            source: source.to_string(),
            interpreter: Some(interpreter.to_string()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ExecutionType;

    #[test]
    fn fixtures_bind() {
        let def = bash_plugin("greet", "echo {{who}}", &["who"]);
        assert_eq!(def.execution_type(), ExecutionType::Bash);
        let bound = def.bind_parameters(&params(&[("who", "x")])).unwrap();
        assert_eq!(bound["who"], "x");
        assert!(def.bind_parameters(&params(&[])).is_err());
    }
}
