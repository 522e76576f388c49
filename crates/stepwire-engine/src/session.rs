use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stepwire_core::{Locator, NodeId};
use thiserror::Error;
use tokio::sync::watch;

/// Key code carried by the synthetic Enter key events.
pub const ENTER_KEY_CODE: u32 = 13;

/// Input types that keep accepting keystrokes after an injection; only
/// these (plus textarea and content-editable) become press-enter targets.
const TEXT_INPUT_TYPES: &[&str] = &[
    "text", "search", "email", "url", "tel", "password", "number",
];

/// Input types whose whole job is being clicked.
const CLICK_INPUT_TYPES: &[&str] = &["button", "submit", "reset", "image", "checkbox", "radio"];

/// Tags that expose a settable value.
const VALUE_TAGS: &[&str] = &["input", "textarea", "button", "option", "output"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Element {node} is no longer attached")]
    Stale { node: NodeId },
    #[error("Invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },
    #[error("No page is loaded")]
    NotReady,
    #[error("Navigation failed: {0}")]
    Navigation(String),
    #[error("Activation failed: {0}")]
    Activation(String),
    #[error("Operation not supported by this session: {0}")]
    NotSupported(String),
}

impl SessionError {
    /// Stable machine-readable code for formatters and logs.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Stale { .. } => "STALE_ELEMENT",
            SessionError::InvalidSelector { .. } => "INVALID_SELECTOR",
            SessionError::NotReady => "NOT_READY",
            SessionError::Navigation(_) => "NAVIGATION_FAILED",
            SessionError::Activation(_) => "ACTIVATION_FAILED",
            SessionError::NotSupported(_) => "NOT_SUPPORTED",
        }
    }

    /// Suggestion surfaced next to the error where one exists.
    pub fn recovery_hint(&self) -> Option<&'static str> {
        match self {
            SessionError::Stale { .. } => {
                Some("The page changed under the step; re-resolve the locator")
            }
            SessionError::InvalidSelector { .. } => {
                Some("Check the css: selector syntax in the link")
            }
            SessionError::NotReady => Some("Load a page before replaying"),
            _ => None,
        }
    }
}

/// What the engine needs to know about one element to pick an injection
/// path, judge click plausibility and track press-enter eligibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFacts {
    /// Lowercase tag name.
    pub tag: String,
    /// `type` attribute for inputs, lowercased.
    pub input_type: Option<String>,
    pub role: Option<String>,
    pub content_editable: bool,
}

/// Injection path for an element, checked in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionKind {
    Select,
    Value,
    Editable,
    Inert,
}

impl ElementFacts {
    pub fn kind(&self) -> InjectionKind {
        if self.tag == "select" {
            InjectionKind::Select
        } else if VALUE_TAGS.contains(&self.tag.as_str()) {
            InjectionKind::Value
        } else if self.content_editable {
            InjectionKind::Editable
        } else {
            InjectionKind::Inert
        }
    }

    /// Eligible to become the press-enter target after an injection.
    pub fn is_text_like(&self) -> bool {
        if self.content_editable || self.tag == "textarea" {
            return true;
        }
        if self.tag != "input" {
            return false;
        }
        match &self.input_type {
            Some(t) => TEXT_INPUT_TYPES.contains(&t.as_str()),
            None => true,
        }
    }

    /// Whether a click on this element is expected to do something.
    pub fn is_click_plausible(&self) -> bool {
        match self.tag.as_str() {
            "button" | "a" => true,
            "input" => match &self.input_type {
                Some(t) => CLICK_INPUT_TYPES.contains(&t.as_str()),
                None => false,
            },
            _ => self
                .role
                .as_deref()
                .map(|r| r.eq_ignore_ascii_case("button"))
                .unwrap_or(false),
        }
    }
}

/// One entry of a select list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Input,
    Change,
    KeyDown,
    KeyUp,
}

/// Synthetic event the engine asks a session to dispatch. Flags are set by
/// the engine; sessions deliver them verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticEvent {
    pub kind: EventKind,
    pub bubbles: bool,
    pub cancelable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_code: Option<u32>,
}

impl SyntheticEvent {
    /// Bubbling, cancelable event without key data (`input` / `change`).
    pub fn bubbling(kind: EventKind) -> SyntheticEvent {
        SyntheticEvent {
            kind,
            bubbles: true,
            cancelable: true,
            key_code: None,
        }
    }

    /// Bubbling, cancelable key event.
    pub fn key(kind: EventKind, key_code: u32) -> SyntheticEvent {
        SyntheticEvent {
            key_code: Some(key_code),
            ..SyntheticEvent::bubbling(kind)
        }
    }
}

/// One loaded page and everything replay needs from it. Implemented by the
/// in-memory host in stepwire-page; a real browser transport would
/// implement the same trait.
#[async_trait]
pub trait PageSession: Send + Sync {
    /// Immediate lookup. `Ok(None)` when nothing matches right now;
    /// `Err(InvalidSelector)` when the locator cannot be evaluated at all.
    async fn find(&self, locator: &Locator) -> Result<Option<NodeId>, SessionError>;

    /// Structural-change feed: the value increases on every subtree or
    /// child-list mutation. Dropping the receiver is the unsubscribe.
    fn changes(&self) -> watch::Receiver<u64>;

    /// Claims the page's one replay slot. True exactly once per load.
    fn try_begin_replay(&self) -> bool;

    async fn is_attached(&self, node: NodeId) -> Result<bool, SessionError>;

    async fn facts(&self, node: NodeId) -> Result<ElementFacts, SessionError>;

    /// Human-readable element label for logs.
    async fn describe(&self, node: NodeId) -> Result<String, SessionError> {
        Ok(format!("element {node}"))
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), SessionError>;

    async fn set_text(&self, node: NodeId, text: &str) -> Result<(), SessionError>;

    async fn options(&self, _node: NodeId) -> Result<Vec<SelectOption>, SessionError> {
        Err(SessionError::NotSupported("options".into()))
    }

    /// Marks the option at `index` selected and updates the select's value.
    async fn choose_option(&self, _node: NodeId, _index: usize) -> Result<(), SessionError> {
        Err(SessionError::NotSupported("choose_option".into()))
    }

    async fn dispatch(&self, node: NodeId, event: SyntheticEvent) -> Result<(), SessionError>;

    /// Native activation, the equivalent of a real click.
    async fn click(&self, node: NodeId) -> Result<(), SessionError>;

    async fn navigate(&self, _url: &str) -> Result<(), SessionError> {
        Err(SessionError::NotSupported("navigate".into()))
    }

    /// Current page URL, used for allowlist gating.
    async fn url(&self) -> Result<String, SessionError> {
        Err(SessionError::NotSupported("url".into()))
    }
}
