//! Wiring a [`Dispatcher`] from configuration.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use warden_approval::{PermissionGate, RateLimiter};
use warden_config::Config;
use warden_core::EventBus;
use warden_sandbox::PluginExecutor;

use crate::config_bridge::{
    to_approval_timeout, to_audit_log, to_classifier, to_executor_config, to_log_config,
    to_pin_verifier, to_rate_limiter_config, to_secrets,
};
use crate::dispatcher::Dispatcher;
use crate::error::RuntimeResult;

/// A fully wired permission gate and sandbox.
///
/// One rate limiter is shared by the dispatcher (`api`), the gate (`auth`)
/// and the executor (`plugin_execution`).
#[derive(Debug)]
pub struct Warden {
    dispatcher: Arc<Dispatcher>,
    limiter: Arc<RateLimiter>,
}

impl Warden {
    /// Build from `config`, placing the default audit file under the warden
    /// home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be resolved or any
    /// component fails to build.
    pub fn from_config(config: &Config) -> RuntimeResult<Self> {
        let home_override = std::env::var("WARDEN_HOME").ok();
        let home = warden_config::loader::warden_home(home_override.as_deref())?;
        Self::from_config_with_home(config, &home)
    }

    /// Build from `config` with an explicit warden home.
    ///
    /// # Errors
    ///
    /// Returns an error if the PIN credential or a classifier pattern is
    /// invalid, the audit log or secrets file cannot be opened, or the plugin
    /// directory cannot be listed.
    pub fn from_config_with_home(config: &Config, home: &Path) -> RuntimeResult<Self> {
        let limiter = Arc::new(RateLimiter::new(to_rate_limiter_config(config)));
        let events = EventBus::new();

        let gate = PermissionGate::new(to_pin_verifier(config)?, events.clone())
            .with_timeout(to_approval_timeout(config))
            .with_rate_limiter(Arc::clone(&limiter));

        let executor = PluginExecutor::new(to_executor_config(config), to_audit_log(config, home)?)
            .with_secrets(to_secrets(config)?)
            .with_rate_limiter(Arc::clone(&limiter));

        let dispatcher = Dispatcher::new(Arc::new(gate), Arc::new(executor), events)
            .with_classifier(to_classifier(config)?)
            .with_rate_limiter(Arc::clone(&limiter));

        if let Some(dir) = &config.plugins.dir {
            if dir.is_dir() {
                dispatcher.plugins().load_dir(dir)?;
            } else {
                warn!(dir = %dir.display(), "Plugin directory not found");
            }
        }

        info!(
            tools = ?dispatcher.tools().names(),
            plugins = dispatcher.plugins().len(),
            approval_timeout_secs = config.security.approval_timeout_secs,
            "Warden ready"
        );
        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            limiter,
        })
    }

    /// The dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

/// Install the global log subscriber described by `[logging]`.
///
/// # Errors
///
/// Returns an error if the logging section is invalid or a subscriber is
/// already installed.
pub fn init_logging(config: &Config) -> RuntimeResult<()> {
    warden_telemetry::setup_logging(&to_log_config(config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{ActionKind, Parameters, RequesterId};

    #[tokio::test]
    async fn builds_from_config() {
        let home = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let plugins = home.path().join("plugins");
        std::fs::create_dir(&plugins).unwrap();
        std::fs::write(
            plugins.join("uptime.toml"),
            "name = \"uptime\"\n[execution]\ntype = \"bash\"\ncommand = \"uptime\"\n",
        )
        .unwrap();

        let mut config = Config::default();
        config.sandbox.work_dir = Some(work.path().to_path_buf());
        config.plugins.dir = Some(plugins);

        let warden = Warden::from_config_with_home(&config, home.path()).unwrap();
        assert_eq!(warden.dispatcher().plugins().names(), vec!["uptime"]);

        let result = warden
            .dispatcher()
            .submit(
                ActionKind::builtin("list_directory"),
                Parameters::new(),
                RequesterId::new("s"),
            )
            .await;
        assert!(!result.is_error, "{}", result.output);

        let audit = std::fs::read_to_string(home.path().join("audit.jsonl")).unwrap();
        assert_eq!(audit.lines().count(), 1);
        assert!(audit.contains("list_directory"));
    }

    #[test]
    fn invalid_pin_credential_fails() {
        let home = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.security.pin.credential = Some("not-a-credential".into());
        assert!(Warden::from_config_with_home(&config, home.path()).is_err());
    }
}
