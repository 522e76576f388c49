//! Heuristics deciding whether an element id looks machine-generated and
//! therefore too unstable to put in a link. The filter is an ordered list
//! of named predicates so hosts can report which rule fired and configs
//! can append their own patterns.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GUID: Regex = Regex::new(
        "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
    )
    .unwrap();
    static ref LONG_HEX: Regex = Regex::new("^[0-9a-fA-F]{16,}$").unwrap();
    static ref DASH_NUMBER: Regex = Regex::new("-[0-9]+$").unwrap();
    static ref EMBER: Regex = Regex::new("^ember-?[0-9]+$").unwrap();
    static ref RADIX: Regex = Regex::new("^radix-").unwrap();
}

/// Ids of one or two characters that are nonetheless meaningful and common
/// enough to trust.
pub const DEFAULT_SHORT_ALLOWLIST: &[&str] = &["q", "id", "s", "go"];

pub struct IdRule {
    name: String,
    test: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl IdRule {
    pub fn new<F>(name: impl Into<String>, test: F) -> IdRule
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        IdRule {
            name: name.into(),
            test: Box::new(test),
        }
    }

    pub fn pattern(name: impl Into<String>, regex: Regex) -> IdRule {
        IdRule::new(name, move |id| regex.is_match(id))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct GeneratedIdFilter {
    rules: Vec<IdRule>,
}

impl GeneratedIdFilter {
    /// The standard rule set with the given short-id allowlist.
    pub fn with_allowlist(allowlist: Vec<String>) -> GeneratedIdFilter {
        let rules = vec![
            IdRule::pattern("guid", GUID.clone()),
            IdRule::pattern("long-hex", LONG_HEX.clone()),
            IdRule::new("digit-soup", |id| {
                id.chars().count() >= 20
                    && id
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                    && id.chars().any(|c| c.is_ascii_digit())
            }),
            IdRule::pattern("dash-number", DASH_NUMBER.clone()),
            IdRule::pattern("ember", EMBER.clone()),
            IdRule::pattern("radix", RADIX.clone()),
            IdRule::new("colon", |id| id.contains(':')),
            IdRule::new("double-underscore", |id| id.contains("__")),
            IdRule::new("short", move |id| {
                id.chars().count() <= 2 && !allowlist.iter().any(|ok| ok == id)
            }),
        ];
        GeneratedIdFilter { rules }
    }

    /// Appends a rule; appended rules run after the standard set.
    pub fn push(&mut self, rule: IdRule) {
        self.rules.push(rule);
    }

    /// Name of the first rule flagging this id as generated, if any.
    pub fn rejects(&self, id: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|rule| (rule.test)(id))
            .map(|rule| rule.name())
    }

    pub fn accepts(&self, id: &str) -> bool {
        self.rejects(id).is_none()
    }
}

impl Default for GeneratedIdFilter {
    fn default() -> GeneratedIdFilter {
        GeneratedIdFilter::with_allowlist(
            DEFAULT_SHORT_ALLOWLIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
        )
    }
}
