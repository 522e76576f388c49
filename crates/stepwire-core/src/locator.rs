use serde::{Deserialize, Serialize};

/// Wire prefix marking a serialized locator as a raw CSS selector.
///
/// The prefix is reserved: a document id that itself starts with `css:`
/// cannot be carried as an id locator, and the synthesizer refuses to emit
/// one (see `synthesize`).
pub const CSS_PREFIX: &str = "css:";

/// Reserved step key introducing a delay. Matched case-insensitively.
pub const WAIT_KEY: &str = "wait";

/// Reserved step key dispatching Enter to the last injected element.
/// Matched case-insensitively; written in camel case when building links.
pub const PRESS_ENTER_KEY: &str = "pressEnter";

/// Step value that requests a click instead of an injection.
/// Matched case-insensitively.
pub const CLICK_MARKER: &str = "click";

/// How a replay step identifies its target element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Locator {
    /// Bare element id, resolved like `getElementById`.
    Id(String),
    /// CSS selector, carried with the `css:` prefix on the wire.
    Css(String),
}

impl Locator {
    /// Parses the serialized form: `css:`-prefixed strings are selectors,
    /// everything else is an element id.
    pub fn parse(raw: &str) -> Locator {
        match raw.strip_prefix(CSS_PREFIX) {
            Some(selector) => Locator::Css(selector.to_string()),
            None => Locator::Id(raw.to_string()),
        }
    }

    /// Serialized form used as the step key in links.
    pub fn encode(&self) -> String {
        match self {
            Locator::Id(id) => id.clone(),
            Locator::Css(selector) => format!("{CSS_PREFIX}{selector}"),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{id}"),
            Locator::Css(selector) => write!(f, "{selector}"),
        }
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Locator::parse(&raw)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.encode()
    }
}
