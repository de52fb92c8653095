//! The action dispatcher.
//!
//! [`Dispatcher::submit`] is the single entry point for actions: it resolves
//! what the action refers to, classifies it once, waits on the permission
//! gate, and runs it on the matching executor. Every attempt ends in an
//! [`ActionResult`] and exactly one audit entry; no failure escapes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_approval::{PermissionGate, RateCategory, RateLimiter, TrustClassifier};
use warden_audit::{AuditLog, AuditLogEntry};
use warden_core::{
    ActionError, ActionId, ActionKind, ActionOutput, ActionRequest, ActionResult, EventBus,
    FailureKind, GateEvent, Parameters, PluginDefinition, RequestStatus, RequesterId,
    SandboxPolicy,
};
use warden_sandbox::PluginExecutor;
use warden_tools::{ToolContext, ToolRegistry};

use crate::error::RuntimeResult;
use crate::registry::PluginRegistry;

/// Performs computer-input-device actions (`screenshot`, `left_click`, ...).
///
/// Without a controller every computer action is refused as unknown.
#[async_trait]
pub trait ComputerController: Send + Sync {
    /// Perform an approved action.
    async fn perform(
        &self,
        action: &str,
        parameters: &Parameters,
        cancel: &CancellationToken,
    ) -> ActionOutput;
}

/// What a submitted action resolved to.
enum Target {
    Tool(String),
    Computer(String),
    Plugin(Arc<PluginDefinition>),
}

struct InFlight {
    requester_id: RequesterId,
    cancel: CancellationToken,
}

type InFlightTable = Mutex<HashMap<ActionId, InFlight>>;

/// Removes a request from the in-flight table when its submit call ends.
struct InFlightGuard<'a> {
    table: &'a InFlightTable,
    id: ActionId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Routes actions through classification, approval and execution.
pub struct Dispatcher {
    classifier: TrustClassifier,
    gate: Arc<PermissionGate>,
    executor: Arc<PluginExecutor>,
    tools: ToolRegistry,
    plugins: Arc<PluginRegistry>,
    computer: Option<Arc<dyn ComputerController>>,
    limiter: Option<Arc<RateLimiter>>,
    audit: AuditLog,
    events: EventBus,
    tool_policy: SandboxPolicy,
    in_flight: InFlightTable,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tools", &self.tools)
            .field("plugins", &self.plugins)
            .field("has_computer", &self.computer.is_some())
            .field("rate_limited", &self.limiter.is_some())
            .field("in_flight", &self.lock_in_flight().len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher with the default classifier and built-in tools, an empty
    /// plugin registry, and the executor's audit log.
    ///
    /// Built-in tools run under the executor's shell policy.
    #[must_use]
    pub fn new(gate: Arc<PermissionGate>, executor: Arc<PluginExecutor>, events: EventBus) -> Self {
        let tools = ToolRegistry::with_defaults();
        let plugins = Arc::new(PluginRegistry::new(tools.names()));
        Self {
            classifier: TrustClassifier::new(),
            audit: executor.audit_log().clone(),
            tool_policy: executor.config().shell.clone(),
            gate,
            executor,
            tools,
            plugins,
            computer: None,
            limiter: None,
            events,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Use a configured classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: TrustClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Replace the built-in tools. The plugin registry should reserve their
    /// names; tools win when a name is taken by both.
    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    /// Share an existing plugin registry.
    #[must_use]
    pub fn with_plugins(mut self, plugins: Arc<PluginRegistry>) -> Self {
        self.plugins = plugins;
        self
    }

    /// Containment for built-in tools.
    #[must_use]
    pub fn with_tool_policy(mut self, policy: SandboxPolicy) -> Self {
        self.tool_policy = policy;
        self
    }

    /// Limit `submit` calls per requester.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Enable computer actions.
    #[must_use]
    pub fn with_computer_controller(mut self, controller: Arc<dyn ComputerController>) -> Self {
        self.computer = Some(controller);
        self
    }

    /// The permission gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// The plugin registry.
    #[must_use]
    pub fn plugins(&self) -> &Arc<PluginRegistry> {
        &self.plugins
    }

    /// The built-in tools.
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// The audit log.
    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// The outbound event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Classify, gate and execute one action.
    ///
    /// Plugin actions may be submitted as [`ActionKind::Plugin`] or by bare
    /// name as [`ActionKind::Builtin`]; the registry's execution type always
    /// wins over the caller's.
    pub async fn submit(
        &self,
        kind: ActionKind,
        parameters: Parameters,
        requester_id: RequesterId,
    ) -> ActionResult {
        let (kind, target) = self.route(kind);

        let mut bind_error = None;
        let parameters = match &target {
            Some(Target::Plugin(def)) => match def.bind_parameters(&parameters) {
                Ok(bound) => bound,
                Err(e) => {
                    bind_error = Some(e);
                    parameters
                },
            },
            _ => parameters,
        };
        let classification = match &target {
            Some(Target::Plugin(def)) => self.classifier.classify_plugin(def, &parameters),
            _ => self.classifier.classify(&kind, &parameters, None),
        };
        let mut request = ActionRequest::new(requester_id, kind, parameters, classification);
        debug!(
            request_id = %request.id,
            requester = %request.requester_id,
            action_kind = %request.kind,
            tier = %request.tier(),
            "Action submitted"
        );

        if let Some(limiter) = &self.limiter
            && !limiter.allow(RateCategory::Api, request.requester_id.as_str())
        {
            let err = ActionError::RateLimited(RateCategory::Api.as_str().to_string());
            return self.refuse(&request, &err);
        }
        let Some(target) = target else {
            let err = ActionError::UnknownAction(request.kind.to_string());
            return self.refuse(&request, &err);
        };
        if let Some(e) = bind_error {
            return self.refuse(&request, &ActionError::InvalidParameters(e.to_string()));
        }

        let cancel = CancellationToken::new();
        let _guard = self.track(&request, cancel.clone());

        let decision = self.gate.request_approval(&mut request).await;
        if let Some(err) = decision.to_action_error() {
            return self.refuse(&request, &err);
        }
        if cancel.is_cancelled() {
            return self.refuse(&request, &ActionError::Cancelled);
        }

        let output = match &target {
            Target::Plugin(def) => self.executor.execute(&request, def, &cancel).await,
            Target::Tool(name) => self.run_tool(&request, name, &cancel).await,
            Target::Computer(action) => self.run_computer(&request, action, &cancel).await,
        };

        self.events.publish(GateEvent::ExecutionCompleted {
            request_id: request.id,
            requester_id: request.requester_id.clone(),
            output: output.output.clone(),
            is_error: output.is_error,
        });
        ActionResult::new(request.id, output)
    }

    /// Apply a human decision to a pending request.
    ///
    /// A second call for the same request fails with
    /// `ApprovalError::UnknownRequest` and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns the gate's error when the request is not pending or the PIN
    /// is missing, wrong, locked out, or throttled.
    pub fn resolve_approval(
        &self,
        id: ActionId,
        approved: bool,
        pin: Option<&str>,
    ) -> RuntimeResult<RequestStatus> {
        self.gate
            .resolve_approval(id, approved, pin)
            .map_err(|e| {
                debug!(request_id = %id, error = %e, "Approval resolution rejected");
                e.into()
            })
    }

    /// Abort a request: deny it if pending, kill its process if running.
    ///
    /// Returns whether the request was known.
    pub fn cancel(&self, id: ActionId) -> bool {
        let was_pending = self.gate.cancel(id);
        let token = self
            .lock_in_flight()
            .get(&id)
            .map(|entry| entry.cancel.clone());
        if let Some(token) = &token {
            token.cancel();
            info!(request_id = %id, "Request cancelled");
        }
        was_pending || token.is_some()
    }

    /// IDs of the requests `requester_id` has waiting or running.
    #[must_use]
    pub fn in_flight_requests(&self, requester_id: &RequesterId) -> Vec<ActionId> {
        self.lock_in_flight()
            .iter()
            .filter(|(_, entry)| &entry.requester_id == requester_id)
            .map(|(id, _)| *id)
            .collect()
    }

    fn route(&self, kind: ActionKind) -> (ActionKind, Option<Target>) {
        match kind {
            ActionKind::Builtin { name } => {
                if self.tools.contains(&name) {
                    let target = Target::Tool(name.clone());
                    (ActionKind::Builtin { name }, Some(target))
                } else if let Some(def) = self.plugins.get(&name) {
                    plugin_target(def)
                } else {
                    (ActionKind::Builtin { name }, None)
                }
            },
            ActionKind::Computer { action } => {
                let target = self
                    .computer
                    .is_some()
                    .then(|| Target::Computer(action.clone()));
                (ActionKind::Computer { action }, target)
            },
            ActionKind::Plugin { name, execution } => match self.plugins.get(&name) {
                Some(def) => plugin_target(def),
                None => (ActionKind::Plugin { name, execution }, None),
            },
        }
    }

    async fn run_tool(
        &self,
        request: &ActionRequest,
        name: &str,
        cancel: &CancellationToken,
    ) -> ActionOutput {
        let Some(tool) = self.tools.get(name) else {
            let err = ActionError::UnknownAction(name.to_string());
            self.audit
                .append(AuditLogEntry::failure(request, err.failure_kind()));
            return ActionOutput::from(&err);
        };
        let ctx = ToolContext::new(self.tool_policy.clone()).with_cancellation(cancel.clone());

        let (output, failure) = match tool.execute(&request.parameters, &ctx).await {
            Ok(output) if output.is_error => (output, Some(FailureKind::ExecutionFailed)),
            Ok(output) => (output, None),
            Err(e) => {
                let err = e.to_action_error();
                warn!(
                    target: "warden::diagnostic",
                    request_id = %request.id,
                    tool = name,
                    error = %e,
                    "Built-in tool failed"
                );
                (ActionOutput::from(&err), Some(err.failure_kind()))
            },
        };
        self.record(request, failure, &output);
        output
    }

    async fn run_computer(
        &self,
        request: &ActionRequest,
        action: &str,
        cancel: &CancellationToken,
    ) -> ActionOutput {
        let Some(controller) = &self.computer else {
            let err = ActionError::UnknownAction(request.kind.to_string());
            self.audit
                .append(AuditLogEntry::failure(request, err.failure_kind()));
            return ActionOutput::from(&err);
        };
        let output = controller
            .perform(action, &request.parameters, cancel)
            .await;
        let failure = output.is_error.then_some(FailureKind::ExecutionFailed);
        self.record(request, failure, &output);
        output
    }

    fn record(&self, request: &ActionRequest, failure: Option<FailureKind>, output: &ActionOutput) {
        let entry = match failure {
            None => AuditLogEntry::success(request),
            Some(kind) => AuditLogEntry::failure(request, kind),
        };
        self.audit.append(entry);
        info!(
            request_id = %request.id,
            requester = %request.requester_id,
            action_kind = %request.kind,
            is_error = output.is_error,
            "Action finished"
        );
    }

    fn refuse(&self, request: &ActionRequest, error: &ActionError) -> ActionResult {
        let failure = error.failure_kind();
        info!(
            request_id = %request.id,
            requester = %request.requester_id,
            action_kind = %request.kind,
            tier = %request.tier(),
            ?failure,
            "Action refused"
        );
        debug!(
            target: "warden::diagnostic",
            request_id = %request.id,
            error = %error,
            "Refusal detail"
        );
        self.audit.append(AuditLogEntry::failure(request, failure));
        ActionResult::new(request.id, ActionOutput::from(error))
    }

    fn track(&self, request: &ActionRequest, cancel: CancellationToken) -> InFlightGuard<'_> {
        self.lock_in_flight().insert(
            request.id,
            InFlight {
                requester_id: request.requester_id.clone(),
                cancel,
            },
        );
        InFlightGuard {
            table: &self.in_flight,
            id: request.id,
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashMap<ActionId, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn plugin_target(def: Arc<PluginDefinition>) -> (ActionKind, Option<Target>) {
    let kind = ActionKind::plugin(def.name.clone(), def.execution_type());
    (kind, Some(Target::Plugin(def)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use warden_approval::{
        ApprovalError, ApprovalHandler, PinCredential, PinVerifier, RateLimiterConfig,
        RateWindow,
    };
    use warden_audit::AuditOutcome;
    use warden_core::{ApprovalPrompt, TrustTier};
    use warden_sandbox::ExecutorConfig;

    struct Prompts(mpsc::UnboundedSender<ApprovalPrompt>);

    #[async_trait]
    impl ApprovalHandler for Prompts {
        async fn present(&self, prompt: ApprovalPrompt) {
            let _ = self.0.send(prompt);
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    struct Fixture {
        dispatcher: Arc<Dispatcher>,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        fixture_with(PinVerifier::disabled(), None)
    }

    fn fixture_with(pin: PinVerifier, limiter: Option<Arc<RateLimiter>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy::new(dir.path()).with_timeout(Duration::from_secs(10));
        let config = ExecutorConfig {
            shell: policy.clone(),
            script: policy,
            fallback_dir: dir.path().join("fallback"),
            ..ExecutorConfig::default()
        };
        let executor = Arc::new(PluginExecutor::new(config, AuditLog::in_memory()));
        let events = EventBus::new();
        let gate = Arc::new(PermissionGate::new(pin, events.clone()));
        let mut dispatcher = Dispatcher::new(gate, executor, events);
        if let Some(limiter) = limiter {
            dispatcher = dispatcher.with_rate_limiter(limiter);
        }
        Fixture {
            dispatcher: Arc::new(dispatcher),
            _dir: dir,
        }
    }

    async fn with_prompts(dispatcher: &Dispatcher) -> mpsc::UnboundedReceiver<ApprovalPrompt> {
        let (tx, rx) = mpsc::unbounded_channel();
        dispatcher
            .gate()
            .set_default_handler(Arc::new(Prompts(tx)))
            .await;
        rx
    }

    fn params(pairs: &[(&str, &str)]) -> Parameters {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
            .collect()
    }

    fn requester() -> RequesterId {
        RequesterId::new("session-1")
    }

    #[tokio::test]
    async fn green_tool_runs_without_handler() {
        let f = fixture();
        let result = f
            .dispatcher
            .submit(
                ActionKind::builtin("list_directory"),
                Parameters::new(),
                requester(),
            )
            .await;
        assert!(!result.is_error, "{}", result.output);

        let entries = f.dispatcher.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, AuditOutcome::Success);
        assert_eq!(entries[0].tier, Some(TrustTier::Green));
    }

    #[tokio::test]
    async fn yellow_tool_is_denied_without_handler() {
        let f = fixture();
        let result = f
            .dispatcher
            .submit(
                ActionKind::builtin("write_file"),
                params(&[("path", "a.txt"), ("content", "x")]),
                requester(),
            )
            .await;
        assert!(result.is_error);
        assert!(result.output.starts_with("denied"));

        let entries = f.dispatcher.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].failure, Some(FailureKind::ApprovalDenied));
    }

    #[tokio::test]
    async fn unknown_actions_are_refused_and_audited() {
        let f = fixture();
        let result = f
            .dispatcher
            .submit(ActionKind::builtin("format_disk"), Parameters::new(), requester())
            .await;
        assert!(result.is_error);
        assert_eq!(result.output, "unknown action 'format_disk'");

        let result = f
            .dispatcher
            .submit(ActionKind::computer("left_click"), Parameters::new(), requester())
            .await;
        assert!(result.is_error);

        let entries = f.dispatcher.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tier, Some(TrustTier::Red));
        assert!(
            entries
                .iter()
                .all(|e| e.failure == Some(FailureKind::UnknownAction))
        );
    }

    #[tokio::test]
    async fn approved_tool_runs_once() {
        let f = fixture();
        let mut prompts = with_prompts(&f.dispatcher).await;
        let d = Arc::clone(&f.dispatcher);
        let task = tokio::spawn(async move {
            d.submit(
                ActionKind::builtin("write_file"),
                params(&[("path", "out.txt"), ("content", "hello")]),
                requester(),
            )
            .await
        });

        let prompt = prompts.recv().await.unwrap();
        assert_eq!(prompt.tier, TrustTier::Yellow);
        assert_eq!(
            f.dispatcher
                .resolve_approval(prompt.request_id, true, None)
                .unwrap(),
            RequestStatus::Approved
        );
        let result = task.await.unwrap();
        assert!(!result.is_error, "{}", result.output);
        assert_eq!(result.request_id, prompt.request_id);

        let second = f.dispatcher.resolve_approval(prompt.request_id, true, None);
        assert!(matches!(
            second,
            Err(crate::RuntimeError::ApprovalError(ApprovalError::UnknownRequest(_)))
        ));
        assert_eq!(f.dispatcher.audit_log().entries().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_red_request_never_executes() {
        let f = fixture();
        let mut prompts = with_prompts(&f.dispatcher).await;
        let d = Arc::clone(&f.dispatcher);
        let task = tokio::spawn(async move {
            d.submit(
                ActionKind::builtin("bash"),
                params(&[("command", "rm -rf /")]),
                requester(),
            )
            .await
        });

        let prompt = prompts.recv().await.unwrap();
        assert_eq!(prompt.tier, TrustTier::Red);
        assert!(prompt.requires_pin);
        tokio::time::advance(Duration::from_secs(301)).await;

        let result = task.await.unwrap();
        assert!(result.is_error);
        assert!(result.output.starts_with("denied"));
        let entries = f.dispatcher.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].failure, Some(FailureKind::ApprovalExpired));
    }

    #[tokio::test]
    async fn cancel_denies_pending_request() {
        let f = fixture();
        let mut prompts = with_prompts(&f.dispatcher).await;
        let d = Arc::clone(&f.dispatcher);
        let task = tokio::spawn(async move {
            d.submit(
                ActionKind::builtin("write_file"),
                params(&[("path", "a.txt"), ("content", "x")]),
                requester(),
            )
            .await
        });

        let prompt = prompts.recv().await.unwrap();
        assert_eq!(
            f.dispatcher.in_flight_requests(&requester()),
            vec![prompt.request_id]
        );
        assert!(f.dispatcher.cancel(prompt.request_id));

        let result = task.await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.output, "cancelled");
        assert!(f.dispatcher.in_flight_requests(&requester()).is_empty());
        assert!(!f.dispatcher.cancel(prompt.request_id));
        assert_eq!(
            f.dispatcher.audit_log().entries().unwrap()[0].failure,
            Some(FailureKind::Cancelled)
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancel_stops_running_command() {
        let f = fixture();
        let mut prompts = with_prompts(&f.dispatcher).await;
        let d = Arc::clone(&f.dispatcher);
        let started = std::time::Instant::now();
        let task = tokio::spawn(async move {
            d.submit(
                ActionKind::builtin("bash"),
                params(&[("command", "sleep 30")]),
                requester(),
            )
            .await
        });

        let prompt = prompts.recv().await.unwrap();
        f.dispatcher
            .resolve_approval(prompt.request_id, true, None)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(f.dispatcher.cancel(prompt.request_id));

        let result = task.await.unwrap();
        assert!(result.is_error);
        assert_eq!(result.output, "cancelled");
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(f.dispatcher.in_flight_requests(&requester()).is_empty());
        let entries = f.dispatcher.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].failure, Some(FailureKind::Cancelled));
    }

    #[tokio::test]
    async fn red_approval_needs_pin() {
        let pin = PinVerifier::new(
            Some(PinCredential::derive("2468")),
            5,
            Duration::from_secs(300),
        );
        let f = fixture_with(pin, None);
        let mut prompts = with_prompts(&f.dispatcher).await;
        let d = Arc::clone(&f.dispatcher);
        let task = tokio::spawn(async move {
            d.submit(
                ActionKind::builtin("bash"),
                params(&[("command", "rm -rf ./build && echo done")]),
                requester(),
            )
            .await
        });

        let prompt = prompts.recv().await.unwrap();
        let id = prompt.request_id;
        assert!(f.dispatcher.resolve_approval(id, true, None).is_err());
        assert!(f.dispatcher.resolve_approval(id, true, Some("0000")).is_err());
        assert_eq!(
            f.dispatcher.resolve_approval(id, true, Some("2468")).unwrap(),
            RequestStatus::Approved
        );

        let result = task.await.unwrap();
        assert!(!result.is_error, "{}", result.output);
        assert_eq!(result.output, "done");
    }

    #[tokio::test]
    async fn plugin_by_bare_name_uses_registry() {
        let f = fixture();
        let def: PluginDefinition = toml::from_str(
            r#"
            name = "greet"

            [[parameters]]
            name = "who"
            type = "string"
            required = true

            [execution]
            type = "bash"
            command = "echo hello {{who}}"
            "#,
        )
        .unwrap();
        f.dispatcher.plugins().create_conversational(def).unwrap();
        let mut prompts = with_prompts(&f.dispatcher).await;

        let missing = f
            .dispatcher
            .submit(ActionKind::builtin("greet"), Parameters::new(), requester())
            .await;
        assert!(missing.is_error);
        assert!(missing.output.starts_with("invalid parameters"));

        let d = Arc::clone(&f.dispatcher);
        let task = tokio::spawn(async move {
            d.submit(
                ActionKind::builtin("greet"),
                params(&[("who", "world; echo pwned")]),
                requester(),
            )
            .await
        });
        let prompt = prompts.recv().await.unwrap();
        assert_eq!(prompt.tier, TrustTier::Yellow);
        f.dispatcher
            .resolve_approval(prompt.request_id, true, None)
            .unwrap();

        let result = task.await.unwrap();
        assert_eq!(result.output, "hello world; echo pwned");

        let entries = f.dispatcher.audit_log().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].failure, Some(FailureKind::InvalidParameters));
        assert_eq!(entries[1].execution_type, "bash");
        assert!(entries[1].is_success());
    }

    #[tokio::test]
    async fn submit_is_rate_limited() {
        let limiter = Arc::new(RateLimiter::new(RateLimiterConfig {
            api: RateWindow::new(Duration::from_secs(60), 1),
            ..RateLimiterConfig::default()
        }));
        let f = fixture_with(PinVerifier::disabled(), Some(limiter));
        let first = f
            .dispatcher
            .submit(ActionKind::builtin("list_directory"), Parameters::new(), requester())
            .await;
        assert!(!first.is_error);
        let second = f
            .dispatcher
            .submit(ActionKind::builtin("list_directory"), Parameters::new(), requester())
            .await;
        assert!(second.is_error);
        assert_eq!(
            f.dispatcher.audit_log().entries().unwrap()[1].failure,
            Some(FailureKind::RateLimited)
        );
    }

    #[tokio::test]
    async fn completion_event_is_published() {
        let f = fixture();
        let mut events = f.dispatcher.events().subscribe();
        let result = f
            .dispatcher
            .submit(ActionKind::builtin("list_directory"), Parameters::new(), requester())
            .await;

        let event = events.recv().await.unwrap();
        match event.as_ref() {
            GateEvent::ExecutionCompleted {
                request_id,
                is_error,
                ..
            } => {
                assert_eq!(*request_id, result.request_id);
                assert!(!is_error);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    struct Recorder;

    #[async_trait]
    impl ComputerController for Recorder {
        async fn perform(
            &self,
            action: &str,
            _parameters: &Parameters,
            _cancel: &CancellationToken,
        ) -> ActionOutput {
            ActionOutput::success(format!("performed {action}"))
        }
    }

    #[tokio::test]
    async fn read_only_computer_action_runs() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(PluginExecutor::new(
            ExecutorConfig {
                shell: SandboxPolicy::new(dir.path()),
                ..ExecutorConfig::default()
            },
            AuditLog::in_memory(),
        ));
        let events = EventBus::new();
        let gate = Arc::new(PermissionGate::new(PinVerifier::disabled(), events.clone()));
        let dispatcher =
            Dispatcher::new(gate, executor, events).with_computer_controller(Arc::new(Recorder));

        let result = dispatcher
            .submit(ActionKind::computer("screenshot"), Parameters::new(), requester())
            .await;
        assert_eq!(result.output, "performed screenshot");
        let result = dispatcher
            .submit(ActionKind::computer("left_click"), Parameters::new(), requester())
            .await;
        assert!(result.output.starts_with("denied"));
    }
}
