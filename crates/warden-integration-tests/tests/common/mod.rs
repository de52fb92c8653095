//! Shared helpers for the integration tests.

use std::sync::Arc;

use tokio::task::JoinHandle;
use warden_core::{ActionKind, ActionResult, Parameters};
use warden_runtime::Dispatcher;
use warden_test::test_requester;

/// Submit on a background task so the test can answer the prompt.
pub fn spawn_submit(
    dispatcher: &Arc<Dispatcher>,
    kind: ActionKind,
    params: Parameters,
) -> JoinHandle<ActionResult> {
    let dispatcher = Arc::clone(dispatcher);
    tokio::spawn(async move { dispatcher.submit(kind, params, test_requester()).await })
}
