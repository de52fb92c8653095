//! A dispatcher wired for tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use warden_approval::{
    PermissionGate, PinCredential, PinVerifier, RateLimiter, RateLimiterConfig,
};
use warden_audit::{AuditLog, AuditLogEntry};
use warden_core::{ApprovalPrompt, EventBus, SandboxPolicy};
use warden_runtime::Dispatcher;
use warden_sandbox::{ExecutorConfig, HttpPolicy, PluginExecutor};

use crate::mocks::{ChannelApprovalHandler, ScriptedResolver};

/// Set up test logging with the given filter.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Builder for [`TestWarden`].
#[derive(Debug, Default)]
pub struct TestWardenBuilder {
    pin: Option<String>,
    approval_timeout: Option<Duration>,
    rate_limits: Option<RateLimiterConfig>,
    resolver: Option<ScriptedResolver>,
    process_timeout: Option<Duration>,
}

impl TestWardenBuilder {
    /// Require `pin` for RED approvals.
    #[must_use]
    pub fn with_pin(mut self, pin: &str) -> Self {
        self.pin = Some(pin.to_string());
        self
    }

    /// Override the five-minute approval window.
    #[must_use]
    pub fn with_approval_timeout(mut self, timeout: Duration) -> Self {
        self.approval_timeout = Some(timeout);
        self
    }

    /// Enforce these rate limits.
    #[must_use]
    pub fn with_rate_limits(mut self, limits: RateLimiterConfig) -> Self {
        self.rate_limits = Some(limits);
        self
    }

    /// Resolve HTTP hosts with `resolver`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: ScriptedResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Timeout for shell and script executions.
    #[must_use]
    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = Some(timeout);
        self
    }

    /// Build the harness.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn build(self) -> TestWarden {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let work_dir = dir.path().join("work");
        std::fs::create_dir_all(&work_dir).expect("Failed to create work directory");

        let policy = SandboxPolicy::new(&work_dir)
            .with_timeout(self.process_timeout.unwrap_or(Duration::from_secs(10)));
        let config = ExecutorConfig {
            shell: policy.clone(),
            script: policy,
            http: HttpPolicy::default(),
            fallback_dir: dir.path().join("fallback"),
            ..ExecutorConfig::default()
        };

        let resolver = Arc::new(self.resolver.unwrap_or_default());
        let limiter = self.rate_limits.map(|l| Arc::new(RateLimiter::new(l)));
        let events = EventBus::new();

        let mut executor = PluginExecutor::new(config, AuditLog::in_memory())
            .with_resolver(Arc::clone(&resolver) as Arc<dyn warden_sandbox::HostResolver>);
        let pin = PinVerifier::new(
            self.pin.as_deref().map(PinCredential::derive),
            warden_approval::pin::DEFAULT_MAX_FAILURES,
            warden_approval::pin::DEFAULT_LOCKOUT,
        );
        let mut gate = PermissionGate::new(pin, events.clone());
        if let Some(timeout) = self.approval_timeout {
            gate = gate.with_timeout(timeout);
        }
        if let Some(limiter) = &limiter {
            executor = executor.with_rate_limiter(Arc::clone(limiter));
            gate = gate.with_rate_limiter(Arc::clone(limiter));
        }

        let mut dispatcher = Dispatcher::new(Arc::new(gate), Arc::new(executor), events);
        if let Some(limiter) = limiter {
            dispatcher = dispatcher.with_rate_limiter(limiter);
        }

        TestWarden {
            dispatcher: Arc::new(dispatcher),
            resolver,
            work_dir,
            _dir: dir,
        }
    }
}

/// A dispatcher with an in-memory audit log and a temporary work directory.
#[derive(Debug)]
pub struct TestWarden {
    /// The dispatcher under test.
    pub dispatcher: Arc<Dispatcher>,
    /// The resolver HTTP plugins use.
    pub resolver: Arc<ScriptedResolver>,
    work_dir: PathBuf,
    _dir: TempDir,
}

impl TestWarden {
    /// Start building a harness.
    #[must_use]
    pub fn builder() -> TestWardenBuilder {
        TestWardenBuilder::default()
    }

    /// Register a channel handler as the default and return its prompts.
    pub async fn attach_handler(&self) -> mpsc::UnboundedReceiver<ApprovalPrompt> {
        let (handler, prompts) = ChannelApprovalHandler::new();
        self.dispatcher.gate().set_default_handler(handler).await;
        prompts
    }

    /// Directory sandboxed processes run in.
    #[must_use]
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Every audit entry so far.
    ///
    /// # Panics
    ///
    /// Panics if the in-memory log cannot be read.
    #[must_use]
    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.dispatcher
            .audit_log()
            .entries()
            .expect("Failed to read audit log")
    }
}
