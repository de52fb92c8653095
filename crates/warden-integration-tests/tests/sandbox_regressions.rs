//! Regression tests for sandbox containment through the full dispatch path.
//!
//! Each scenario submits a plugin, approves it, and checks that the
//! sandbox refused or contained it and that the audit trail says so.

mod common;

use common::spawn_submit;
use warden_core::{ActionKind, ExecutionType, FailureKind};
use warden_runtime::RuntimeError;
use warden_test::{
    ScriptedResolver, TestWarden, bash_plugin, http_plugin, params, script_plugin,
};

/// Submit a plugin, approve the prompt, and return the result.
async fn approve_plugin(
    warden: &TestWarden,
    name: &str,
    execution: ExecutionType,
    pairs: &[(&str, &str)],
) -> warden_core::ActionResult {
    let mut prompts = warden.attach_handler().await;
    let task = spawn_submit(
        &warden.dispatcher,
        ActionKind::plugin(name, execution),
        params(pairs),
    );
    let prompt = prompts.recv().await.unwrap();
    warden
        .dispatcher
        .resolve_approval(prompt.request_id, true, None)
        .unwrap();
    task.await.unwrap()
}

#[tokio::test]
async fn metadata_endpoint_is_blocked() {
    let warden = TestWarden::builder().build();
    warden
        .dispatcher
        .plugins()
        .create_conversational(http_plugin(
            "instance_info",
            "http://169.254.169.254/latest/meta-data/{{path}}",
            &["path"],
        ))
        .unwrap();

    let result = approve_plugin(
        &warden,
        "instance_info",
        ExecutionType::Http,
        &[("path", "iam/security-credentials/")],
    )
    .await;
    assert!(result.is_error);
    assert!(result.output.starts_with("blocked"));
    assert!(!result.output.contains("169.254"));

    let entries = warden.audit_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].failure, Some(FailureKind::SandboxViolation));
    assert_eq!(entries[0].parameter_names, vec!["path".to_string()]);
    let line = serde_json::to_string(&entries[0]).unwrap();
    assert!(!line.contains("security-credentials"));
}

#[tokio::test]
async fn dns_rebinding_is_rejected_before_connecting() {
    let resolver = ScriptedResolver::new().sequence(
        "rebind.example",
        &[&["93.184.216.34"], &["127.0.0.1"]],
    );
    let warden = TestWarden::builder().with_resolver(resolver).build();
    warden
        .dispatcher
        .plugins()
        .create_conversational(http_plugin("lookup", "http://rebind.example/status", &[]))
        .unwrap();

    let result = approve_plugin(&warden, "lookup", ExecutionType::Http, &[]).await;
    assert!(result.is_error);
    assert!(result.output.starts_with("blocked"));
    assert_eq!(warden.resolver.calls(), 2);
    assert_eq!(
        warden.audit_entries()[0].failure,
        Some(FailureKind::SandboxViolation)
    );
}

#[tokio::test]
async fn private_answer_is_rejected() {
    let resolver = ScriptedResolver::new().answer("intranet.example", &["10.0.0.5"]);
    let warden = TestWarden::builder().with_resolver(resolver).build();
    warden
        .dispatcher
        .plugins()
        .create_conversational(http_plugin("wiki", "http://intranet.example/", &[]))
        .unwrap();

    let result = approve_plugin(&warden, "wiki", ExecutionType::Http, &[]).await;
    assert!(result.output.starts_with("blocked"));
    assert_eq!(warden.resolver.calls(), 1);
}

#[tokio::test]
async fn shell_metacharacters_stay_in_their_argument() {
    let warden = TestWarden::builder().build();
    warden
        .dispatcher
        .plugins()
        .create_conversational(bash_plugin("say", "echo {{message}}", &["message"]))
        .unwrap();

    let payload = "hi; touch pwned $(touch pwned2) `touch pwned3`";
    let result = approve_plugin(&warden, "say", ExecutionType::Bash, &[("message", payload)]).await;
    assert!(!result.is_error, "{}", result.output);
    assert_eq!(result.output, payload);
    for name in ["pwned", "pwned2", "pwned3"] {
        assert!(!warden.work_dir().join(name).exists(), "{name} was created");
    }
}

#[test]
fn quoted_command_placeholders_are_refused_at_install() {
    let warden = TestWarden::builder().build();
    for command in ["echo \"{{message}}\"", "echo '{{message}}'"] {
        let err = warden
            .dispatcher
            .plugins()
            .create_conversational(bash_plugin("say", command, &["message"]))
            .unwrap_err();
        assert!(
            matches!(err, RuntimeError::UnsafeCommandTemplate { .. }),
            "{command}: {err}"
        );
    }
    assert!(warden.dispatcher.plugins().get("say").is_none());
}

#[test]
fn conversational_script_plugins_are_refused() {
    let warden = TestWarden::builder().build();
    let err = warden
        .dispatcher
        .plugins()
        .create_conversational(script_plugin("cleanup", "print('hi')", "python3"))
        .unwrap_err();
    assert!(matches!(
        err,
        RuntimeError::DisallowedExecutionType {
            execution: ExecutionType::Script,
            ..
        }
    ));
    assert!(warden.dispatcher.plugins().get("cleanup").is_none());
}
