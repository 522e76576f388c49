//! Step dispatchers. Every function here is total: failures are logged and
//! reported through the return value, never raised, so one broken step can
//! never take the rest of the sequence down with it.

use std::time::Duration;

use stepwire_core::NodeId;
use tracing::{debug, warn};

use crate::session::{EventKind, InjectionKind, PageSession, SyntheticEvent, ENTER_KEY_CODE};

/// Result of an injection attempt. `text_like` marks elements that stay
/// eligible as press-enter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    Injected { text_like: bool },
    Failed,
}

/// Result of a press-enter attempt. `Skipped` means no key event went out;
/// `Failed` means the key-down was already delivered when the key-up could
/// not be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    Pressed,
    Skipped,
    Failed,
}

impl InjectOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, InjectOutcome::Injected { .. })
    }
}

/// Injects `value` into the element the way a user-typed change would look
/// to the page: state first, then the notifications in the order pages
/// observe them from real input.
pub async fn inject(session: &dyn PageSession, node: NodeId, value: &str) -> InjectOutcome {
    let facts = match session.facts(node).await {
        Ok(facts) => facts,
        Err(error) => {
            warn!(node, %error, "cannot inspect injection target");
            return InjectOutcome::Failed;
        }
    };
    match facts.kind() {
        InjectionKind::Select => inject_select(session, node, value).await,
        InjectionKind::Value => {
            if let Err(error) = session.set_value(node, value).await {
                warn!(node, %error, "failed to set value");
                return InjectOutcome::Failed;
            }
            if dispatch_pair(session, node, EventKind::Input, EventKind::Change).await {
                InjectOutcome::Injected {
                    text_like: facts.is_text_like(),
                }
            } else {
                InjectOutcome::Failed
            }
        }
        InjectionKind::Editable => {
            if let Err(error) = session.set_text(node, value).await {
                warn!(node, %error, "failed to set text content");
                return InjectOutcome::Failed;
            }
            match session
                .dispatch(node, SyntheticEvent::bubbling(EventKind::Input))
                .await
            {
                Ok(()) => InjectOutcome::Injected { text_like: true },
                Err(error) => {
                    warn!(node, %error, "failed to dispatch input notification");
                    InjectOutcome::Failed
                }
            }
        }
        InjectionKind::Inert => {
            warn!(node, tag = %facts.tag, "element cannot receive a value");
            InjectOutcome::Failed
        }
    }
}

/// Select lists pick the first option whose value matches exactly; pages
/// hear `change` before `input` for selects. No match leaves the select
/// untouched.
async fn inject_select(session: &dyn PageSession, node: NodeId, value: &str) -> InjectOutcome {
    let options = match session.options(node).await {
        Ok(options) => options,
        Err(error) => {
            warn!(node, %error, "cannot list select options");
            return InjectOutcome::Failed;
        }
    };
    let index = match options.iter().position(|option| option.value == value) {
        Some(index) => index,
        None => {
            warn!(node, value, "no option with this value");
            return InjectOutcome::Failed;
        }
    };
    if let Err(error) = session.choose_option(node, index).await {
        warn!(node, index, %error, "failed to choose option");
        return InjectOutcome::Failed;
    }
    if dispatch_pair(session, node, EventKind::Change, EventKind::Input).await {
        InjectOutcome::Injected { text_like: false }
    } else {
        InjectOutcome::Failed
    }
}

async fn dispatch_pair(
    session: &dyn PageSession,
    node: NodeId,
    first: EventKind,
    second: EventKind,
) -> bool {
    for kind in [first, second] {
        if let Err(error) = session.dispatch(node, SyntheticEvent::bubbling(kind)).await {
            warn!(node, ?kind, %error, "failed to dispatch notification");
            return false;
        }
    }
    true
}

/// Clicks the element. Implausible targets are warned about but still
/// clicked; the user may know the page better than the heuristic does.
pub async fn click(session: &dyn PageSession, node: NodeId) -> bool {
    match session.facts(node).await {
        Ok(facts) if !facts.is_click_plausible() => {
            warn!(node, tag = %facts.tag, "target does not look clickable, clicking anyway");
        }
        Err(error) => {
            warn!(node, %error, "cannot inspect click target, clicking anyway");
        }
        Ok(_) => {}
    }
    match session.click(node).await {
        Ok(()) => true,
        Err(error) => {
            warn!(node, %error, "click failed");
            false
        }
    }
}

/// Presses Enter on the last injected element, if there is one and it is
/// still in the document: key-down, a short pause, key-up.
pub async fn press_enter(
    session: &dyn PageSession,
    target: Option<NodeId>,
    keyup_delay: Duration,
) -> EnterOutcome {
    let node = match target {
        Some(node) => node,
        None => {
            warn!("press-enter with no previously injected element");
            return EnterOutcome::Skipped;
        }
    };
    match session.is_attached(node).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(node, "press-enter target is no longer attached");
            return EnterOutcome::Skipped;
        }
        Err(error) => {
            warn!(node, %error, "cannot check press-enter target");
            return EnterOutcome::Skipped;
        }
    }
    if let Err(error) = session
        .dispatch(node, SyntheticEvent::key(EventKind::KeyDown, ENTER_KEY_CODE))
        .await
    {
        warn!(node, %error, "failed to dispatch key-down");
        return EnterOutcome::Skipped;
    }
    tokio::time::sleep(keyup_delay).await;
    if let Err(error) = session
        .dispatch(node, SyntheticEvent::key(EventKind::KeyUp, ENTER_KEY_CODE))
        .await
    {
        warn!(node, %error, "key-down delivered but key-up failed");
        return EnterOutcome::Failed;
    }
    debug!(node, "enter pressed");
    EnterOutcome::Pressed
}
