//! Change-driven waiting. The primitive is deliberately generic: subscribe
//! to a change feed, probe, re-probe on every notification, give up at the
//! deadline. Locator resolution is one instantiation; anything that can be
//! phrased as "poll a predicate when the page mutates" reuses it.

use std::cell::Cell;
use std::future::Future;
use std::time::Duration;

use stepwire_core::{Locator, NodeId};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::session::PageSession;

/// Runs `probe` once immediately, then once per change notification, until
/// it produces a value or `timeout` elapses. Returns `None` on deadline or
/// when the change feed closes (the page is gone). The receiver subscription
/// is the only observer; it ends with this future.
pub async fn wait_until<T, F, Fut>(
    changes: &mut watch::Receiver<u64>,
    timeout: Duration,
    mut probe: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    if let Some(hit) = probe().await {
        return Some(hit);
    }
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return None;
                }
                if let Some(hit) = probe().await {
                    return Some(hit);
                }
            }
            _ = tokio::time::sleep_until(deadline) => return None,
        }
    }
}

/// Resolves a locator against the live page, waiting for the element to
/// appear. `None` means the deadline passed; a merely-missing element is
/// never an error. A selector the session cannot evaluate is logged and
/// counts as a miss for that attempt.
pub async fn resolve_locator(
    session: &dyn PageSession,
    locator: &Locator,
    timeout: Duration,
) -> Option<NodeId> {
    // Subscribe before the first probe so a mutation racing the lookup
    // still delivers a notification.
    let mut changes = session.changes();
    let warned = Cell::new(false);
    let warned = &warned;
    let probe = move || async move {
        match session.find(locator).await {
            Ok(found) => found,
            Err(error) => {
                if !warned.replace(true) {
                    warn!(%locator, %error, "lookup failed, treating as not found");
                } else {
                    debug!(%locator, %error, "lookup failed again");
                }
                None
            }
        }
    };
    wait_until(&mut changes, timeout, probe).await
}
