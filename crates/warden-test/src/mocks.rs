//! Mock implementations for testing.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use warden_approval::ApprovalHandler;
use warden_core::ApprovalPrompt;
use warden_sandbox::HostResolver;

/// Approval handler that forwards every prompt into a channel.
///
/// Tests read prompts from the receiver and answer through
/// `Dispatcher::resolve_approval`, the same way a chat frontend would.
#[derive(Debug)]
pub struct ChannelApprovalHandler {
    prompts: mpsc::UnboundedSender<ApprovalPrompt>,
    available: AtomicBool,
}

impl ChannelApprovalHandler {
    /// Create a handler and the receiving end of its prompt channel.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ApprovalPrompt>) {
        let (prompts, rx) = mpsc::unbounded_channel();
        let handler = Arc::new(Self {
            prompts,
            available: AtomicBool::new(true),
        });
        (handler, rx)
    }

    /// Simulate the frontend connecting or disconnecting.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApprovalHandler for ChannelApprovalHandler {
    async fn present(&self, prompt: ApprovalPrompt) {
        let _ = self.prompts.send(prompt);
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Handler that is registered but never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisconnectedHandler;

#[async_trait]
impl ApprovalHandler for DisconnectedHandler {
    async fn present(&self, _prompt: ApprovalPrompt) {}

    fn is_available(&self) -> bool {
        false
    }
}

/// DNS resolver with per-host scripted answers.
///
/// Each host has a queue of answers. Every lookup takes the next one; the
/// last answer repeats. Unknown hosts fail like NXDOMAIN.
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    answers: Mutex<HashMap<String, VecDeque<Vec<IpAddr>>>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    /// Resolver with no hosts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `host` with `ips`.
    ///
    /// # Panics
    ///
    /// Panics if an address does not parse.
    #[must_use]
    pub fn answer(self, host: &str, ips: &[&str]) -> Self {
        self.sequence(host, &[ips])
    }

    /// Answer `host` with each entry of `sequence` in turn.
    ///
    /// # Panics
    ///
    /// Panics if an address does not parse.
    #[must_use]
    pub fn sequence(self, host: &str, sequence: &[&[&str]]) -> Self {
        let queue = sequence
            .iter()
            .map(|ips| {
                ips.iter()
                    .map(|ip| ip.parse().expect("invalid IP address in test script"))
                    .collect()
            })
            .collect();
        self.answers
            .lock()
            .expect("resolver lock poisoned")
            .insert(host.to_ascii_lowercase(), queue);
        self
    }

    /// Number of lookups performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostResolver for ScriptedResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut answers = self
            .answers
            .lock()
            .map_err(|_| std::io::Error::other("resolver lock poisoned"))?;
        let queue = answers
            .get_mut(&host.to_ascii_lowercase())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "nxdomain"))?;
        let ips = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().cloned().unwrap_or_default()
        };
        Ok(ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect())
    }
}
