use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;

use crate::locator::{Locator, CLICK_MARKER, PRESS_ENTER_KEY, WAIT_KEY};

lazy_static! {
    // <digits> <optional whitespace> ms|s, unit case-insensitive.
    static ref WAIT_PAYLOAD: Regex = Regex::new(r"(?i)^([0-9]+)\s*(ms|s)$").unwrap();
}

/// What a target step does once its element resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Click,
    Inject(String),
}

/// One decoded key/value pair, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Empty key. Counted in step indices, otherwise inert.
    Blank,
    /// Reserved `wait` key. `delay` is `None` when the payload failed the
    /// duration grammar; replay logs that and continues without delay.
    Wait { delay: Option<Duration>, raw: String },
    /// Reserved `pressEnter` key.
    PressEnter,
    /// Ordinary step: resolve the locator, then click or inject.
    Target { locator: Locator, action: Action },
}

impl Step {
    /// Classifies a decoded pair. Reserved keys and the click marker are
    /// matched case-insensitively; every other key is a locator.
    pub fn classify(key: &str, value: &str) -> Step {
        if key.is_empty() {
            return Step::Blank;
        }
        if key.eq_ignore_ascii_case(WAIT_KEY) {
            return Step::Wait {
                delay: parse_wait_duration(value),
                raw: value.to_string(),
            };
        }
        if key.eq_ignore_ascii_case(PRESS_ENTER_KEY) {
            return Step::PressEnter;
        }
        let action = if value.eq_ignore_ascii_case(CLICK_MARKER) {
            Action::Click
        } else {
            Action::Inject(value.to_string())
        };
        Step::Target {
            locator: Locator::parse(key),
            action,
        }
    }

    /// Wait step with a well-formed payload.
    pub fn wait(delay: Duration) -> Step {
        let millis = delay.as_millis().min(u64::MAX as u128) as u64;
        Step::Wait {
            delay: Some(Duration::from_millis(millis)),
            raw: format!("{millis}ms"),
        }
    }

    /// The `(key, value)` this step writes into a link, unencoded.
    /// `Blank` has no wire form.
    pub fn wire_pair(&self) -> Option<(String, String)> {
        match self {
            Step::Blank => None,
            Step::Wait { raw, .. } => Some((WAIT_KEY.to_string(), raw.clone())),
            Step::PressEnter => Some((PRESS_ENTER_KEY.to_string(), "true".to_string())),
            Step::Target { locator, action } => {
                let value = match action {
                    Action::Click => CLICK_MARKER.to_string(),
                    Action::Inject(text) => text.clone(),
                };
                Some((locator.encode(), value))
            }
        }
    }
}

/// Parses a wait payload (`500ms`, `2s`, `2 S`). Returns `None` for
/// anything outside the grammar, including digit runs that overflow u64.
pub fn parse_wait_duration(payload: &str) -> Option<Duration> {
    let captures = WAIT_PAYLOAD.captures(payload)?;
    let amount: u64 = captures[1].parse().ok()?;
    let millis = if captures[2].eq_ignore_ascii_case("s") {
        amount.saturating_mul(1000)
    } else {
        amount
    };
    Some(Duration::from_millis(millis))
}
