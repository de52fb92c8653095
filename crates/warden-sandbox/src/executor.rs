//! The plugin executor.
//!
//! [`PluginExecutor::execute`] runs one approved request against its
//! definition, dispatching on the [`ExecutionSpec`] variant. Every call
//! writes exactly one audit entry, on success and on every failure path,
//! before the output is returned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_approval::{RateCategory, RateLimiter};
use warden_audit::{AuditLog, AuditLogEntry};
use warden_core::{
    ActionKind, ActionOutput, ActionRequest, ExecutionSpec, ExecutionType, FailureKind,
    PluginDefinition, SandboxPolicy,
};

use crate::error::{SandboxError, SandboxResult};
use crate::http::{HttpPolicy, HttpStrategy};
use crate::process::{ProcessOutput, safe_work_dir};
use crate::resolver::HostResolver;
use crate::script::run_script;
use crate::secrets::Secrets;
use crate::shell::{render_command, run_shell};

/// Default interpreter for script plugins.
pub const DEFAULT_SCRIPT_INTERPRETER: &str = "python3";

/// Default script timeout (1 minute).
const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default script memory cap (512 MiB).
const DEFAULT_SCRIPT_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// Containment settings for every execution type.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Policy for shell plugins.
    pub shell: SandboxPolicy,
    /// Policy for script plugins.
    pub script: SandboxPolicy,
    /// Policy for HTTP plugins.
    pub http: HttpPolicy,
    /// The server's own installation tree; never used as a work dir.
    pub install_dir: Option<PathBuf>,
    /// Work dir used when a policy's own is refused.
    pub fallback_dir: PathBuf,
    /// Interpreter for script plugins that do not name one.
    pub script_interpreter: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let shell = SandboxPolicy::default();
        let script = SandboxPolicy::new(shell.work_dir.clone())
            .with_timeout(DEFAULT_SCRIPT_TIMEOUT)
            .with_max_memory_bytes(Some(DEFAULT_SCRIPT_MEMORY_BYTES));
        Self {
            fallback_dir: shell.work_dir.clone(),
            shell,
            script,
            http: HttpPolicy::default(),
            install_dir: None,
            script_interpreter: DEFAULT_SCRIPT_INTERPRETER.to_string(),
        }
    }
}

/// Runs approved plugin requests inside the sandbox.
pub struct PluginExecutor {
    config: ExecutorConfig,
    http: HttpStrategy,
    secrets: Secrets,
    audit: AuditLog,
    limiter: Option<Arc<RateLimiter>>,
}

impl std::fmt::Debug for PluginExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginExecutor")
            .field("config", &self.config)
            .field("secrets", &self.secrets)
            .field("rate_limited", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl PluginExecutor {
    /// Executor using the system resolver and an empty secret store.
    #[must_use]
    pub fn new(config: ExecutorConfig, audit: AuditLog) -> Self {
        let http = HttpStrategy::with_system_resolver(config.http.clone());
        Self {
            config,
            http,
            secrets: Secrets::new(),
            audit,
            limiter: None,
        }
    }

    /// Use `secrets` for `{{secret.NAME}}` placeholders.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Secrets) -> Self {
        self.secrets = secrets;
        self
    }

    /// Use `resolver` for HTTP host lookups.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.http = HttpStrategy::new(self.config.http.clone(), resolver);
        self
    }

    /// Enforce the plugin execution rate limit per requester.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The audit log entries are written to.
    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// The secret store.
    #[must_use]
    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    /// The configured policy for a process-based execution type.
    #[must_use]
    pub fn policy_for(&self, execution: ExecutionType) -> &SandboxPolicy {
        match execution {
            ExecutionType::Script => &self.config.script,
            ExecutionType::Http | ExecutionType::Bash => &self.config.shell,
        }
    }

    /// Run `request` with the configured policy for its execution type.
    pub async fn execute(
        &self,
        request: &ActionRequest,
        definition: &PluginDefinition,
        cancel: &CancellationToken,
    ) -> ActionOutput {
        let policy = self.policy_for(definition.execution_type());
        self.execute_with_policy(request, definition, policy, cancel)
            .await
    }

    /// Run `request` under an explicit `policy`.
    ///
    /// Failures are recovered into an error [`ActionOutput`] carrying a
    /// caller-safe message; the detailed cause goes to the diagnostic log.
    pub async fn execute_with_policy(
        &self,
        request: &ActionRequest,
        definition: &PluginDefinition,
        policy: &SandboxPolicy,
        cancel: &CancellationToken,
    ) -> ActionOutput {
        let (output, failure) = match self.run(request, definition, policy, cancel).await {
            Ok(output) if output.is_error => (output, Some(FailureKind::ExecutionFailed)),
            Ok(output) => (output, None),
            Err(e) => {
                let action_error = e.to_action_error();
                warn!(
                    target: "warden::diagnostic",
                    request_id = %request.id,
                    plugin = %definition.name,
                    error = %e,
                    "Plugin execution failed"
                );
                (
                    ActionOutput::from(&action_error),
                    Some(action_error.failure_kind()),
                )
            },
        };

        let entry = match failure {
            None => AuditLogEntry::success(request),
            Some(kind) => AuditLogEntry::failure(request, kind),
        };
        self.audit.append(entry);

        info!(
            request_id = %request.id,
            requester = %request.requester_id,
            plugin = %definition.name,
            execution = %definition.execution_type().as_str(),
            is_error = output.is_error,
            "Plugin execution finished"
        );
        output
    }

    async fn run(
        &self,
        request: &ActionRequest,
        definition: &PluginDefinition,
        policy: &SandboxPolicy,
        cancel: &CancellationToken,
    ) -> SandboxResult<ActionOutput> {
        if !request.status().is_approved() {
            return Err(SandboxError::NotApproved);
        }
        if let ActionKind::Plugin { name, execution } = &request.kind
            && (name != &definition.name || *execution != definition.execution_type())
        {
            return Err(SandboxError::Violation(format!(
                "request for '{name}' does not match definition '{}'",
                definition.name
            )));
        }
        if let Some(limiter) = &self.limiter
            && !limiter.allow(RateCategory::PluginExecution, request.requester_id.as_str())
        {
            return Err(SandboxError::RateLimited);
        }

        let params = &request.parameters;
        match &definition.execution {
            spec @ ExecutionSpec::Http { .. } => {
                let outcome = self.http.execute(spec, params, &self.secrets).await?;
                Ok(ActionOutput::success(outcome.body))
            },
            ExecutionSpec::Bash { command } => {
                let command = render_command(command, params, &self.secrets)?;
                let work_dir = self.prepare_work_dir(&policy.work_dir).await?;
                let output =
                    run_shell(&command, policy, &work_dir, &definition.env, cancel).await?;
                Ok(process_output(&output, policy))
            },
            ExecutionSpec::Script {
                source,
                interpreter,
            } => {
                let interpreter = interpreter
                    .as_deref()
                    .unwrap_or(&self.config.script_interpreter);
                let work_dir = self.prepare_work_dir(&policy.work_dir).await?;
                let output = run_script(
                    source,
                    interpreter,
                    params,
                    policy,
                    &work_dir,
                    &definition.env,
                    cancel,
                )
                .await?;
                Ok(process_output(&output, policy))
            },
        }
    }

    async fn prepare_work_dir(&self, requested: &Path) -> SandboxResult<PathBuf> {
        tokio::fs::create_dir_all(&self.config.fallback_dir).await?;
        if !requested.exists() {
            tokio::fs::create_dir_all(requested).await?;
        }
        Ok(safe_work_dir(
            requested,
            self.config.install_dir.as_deref(),
            &self.config.fallback_dir,
        ))
    }
}

fn process_output(output: &ProcessOutput, policy: &SandboxPolicy) -> ActionOutput {
    let text = output.render(policy.max_output_bytes);
    if output.success() {
        ActionOutput::success(text)
    } else {
        ActionOutput::error(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use warden_audit::AuditOutcome;
    use warden_core::{Classification, Parameters, RequesterId, TrustTier};

    struct NoDns;

    #[async_trait::async_trait]
    impl HostResolver for NoDns {
        async fn resolve(&self, _host: &str, _port: u16) -> std::io::Result<Vec<SocketAddr>> {
            Err(std::io::Error::other("offline"))
        }
    }

    fn definition(toml_src: &str) -> PluginDefinition {
        toml::from_str(toml_src).unwrap()
    }

    fn approved(def: &PluginDefinition, params: Parameters) -> ActionRequest {
        ActionRequest::new(
            RequesterId::new("agent-1"),
            ActionKind::plugin(def.name.clone(), def.execution_type()),
            params,
            Classification::new(TrustTier::Green, "test"),
        )
    }

    fn executor(dir: &Path) -> PluginExecutor {
        let config = ExecutorConfig {
            shell: SandboxPolicy::new(dir).with_timeout(Duration::from_secs(10)),
            script: SandboxPolicy::new(dir).with_timeout(Duration::from_secs(10)),
            fallback_dir: dir.join("fallback"),
            ..ExecutorConfig::default()
        };
        PluginExecutor::new(config, AuditLog::in_memory()).with_resolver(Arc::new(NoDns))
    }

    #[tokio::test]
    async fn unapproved_request_is_refused_and_audited() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let def = definition(
            "name = \"hello\"\n[execution]\ntype = \"bash\"\ncommand = \"echo hi\"\n",
        );
        let request = ActionRequest::new(
            RequesterId::new("agent-1"),
            ActionKind::plugin("hello", ExecutionType::Bash),
            Parameters::new(),
            Classification::new(TrustTier::Yellow, "plugin"),
        );
        let out = exec.execute(&request, &def, &CancellationToken::new()).await;
        assert!(out.is_error);
        let entries = exec.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].failure, Some(FailureKind::ApprovalDenied));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_success_writes_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let def = definition(
            "name = \"greet\"\n[[parameters]]\nname = \"who\"\ntype = \"string\"\n\
             [execution]\ntype = \"bash\"\ncommand = \"echo hello {{who}}\"\n",
        );
        let mut params = Parameters::new();
        params.insert("who".into(), "world; id".into());
        let out = exec
            .execute(&approved(&def, params), &def, &CancellationToken::new())
            .await;
        assert!(!out.is_error, "{}", out.output);
        assert_eq!(out.output, "hello world; id");

        let entries = exec.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, AuditOutcome::Success);
        assert_eq!(entries[0].parameter_names, vec!["who".to_string()]);
        assert_eq!(entries[0].execution_type, "bash");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_audited_error() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let def = definition("name = \"fail\"\n[execution]\ntype = \"bash\"\ncommand = \"exit 4\"\n");
        let out = exec
            .execute(&approved(&def, Parameters::new()), &def, &CancellationToken::new())
            .await;
        assert!(out.is_error);
        assert!(out.output.contains("(exit code: 4)"));
        let entries = exec.audit_log().entries().unwrap();
        assert_eq!(entries[0].failure, Some(FailureKind::ExecutionFailed));
    }

    #[tokio::test]
    async fn metadata_target_is_a_sandbox_violation() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let def = definition(
            "name = \"meta\"\n[execution]\ntype = \"http\"\nmethod = \"GET\"\n\
             url = \"http://169.254.169.254/latest/meta-data/\"\n",
        );
        let out = exec
            .execute(&approved(&def, Parameters::new()), &def, &CancellationToken::new())
            .await;
        assert!(out.is_error);
        assert!(!out.output.contains("169.254"));
        let entries = exec.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].failure, Some(FailureKind::SandboxViolation));
    }

    #[tokio::test]
    async fn dns_failure_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let def = definition(
            "name = \"weather\"\n[execution]\ntype = \"http\"\n\
             url = \"https://api.weather.example/today\"\n",
        );
        let out = exec
            .execute(&approved(&def, Parameters::new()), &def, &CancellationToken::new())
            .await;
        assert!(out.is_error);
        assert_eq!(
            exec.audit_log().entries().unwrap()[0].failure,
            Some(FailureKind::SandboxViolation)
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn plugin_execution_rate_limit_applies() {
        use warden_approval::{RateLimiterConfig, RateWindow};

        let dir = tempfile::tempdir().unwrap();
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            plugin_execution: RateWindow::new(Duration::from_secs(60), 1),
            ..RateLimiterConfig::default()
        }));
        let exec = executor(dir.path()).with_rate_limiter(limiter);
        let def = definition("name = \"ok\"\n[execution]\ntype = \"bash\"\ncommand = \"true\"\n");

        let first = exec
            .execute(&approved(&def, Parameters::new()), &def, &CancellationToken::new())
            .await;
        assert!(!first.is_error);
        let second = exec
            .execute(&approved(&def, Parameters::new()), &def, &CancellationToken::new())
            .await;
        assert!(second.is_error);
        let entries = exec.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].failure, Some(FailureKind::RateLimited));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn script_uses_definition_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let def = definition(
            "name = \"echo_params\"\n[[parameters]]\nname = \"n\"\ntype = \"integer\"\n\
             [execution]\ntype = \"script\"\ninterpreter = \"sh\"\nsource = \"cat\"\n",
        );
        let mut params = Parameters::new();
        params.insert("n".into(), 7.into());
        let out = exec
            .execute(&approved(&def, params), &def, &CancellationToken::new())
            .await;
        assert_eq!(out.output, r#"{"n":7}"#);
    }

    #[tokio::test]
    async fn mismatched_definition_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let def = definition("name = \"a\"\n[execution]\ntype = \"bash\"\ncommand = \"true\"\n");
        let other = definition("name = \"b\"\n[execution]\ntype = \"bash\"\ncommand = \"true\"\n");
        let out = exec
            .execute(&approved(&other, Parameters::new()), &def, &CancellationToken::new())
            .await;
        assert!(out.is_error);
        assert_eq!(
            exec.audit_log().entries().unwrap()[0].failure,
            Some(FailureKind::SandboxViolation)
        );
    }
}
