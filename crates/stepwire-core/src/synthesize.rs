//! Capture-side identifier synthesis: given the element a user picked,
//! widen to the nearest interactive element, then walk an ordered list of
//! strategies until one produces a locator that uniquely resolves in the
//! live document. Strategies are trait objects with a uniform `attempt`
//! so hosts can reorder or extend the cascade.

use thiserror::Error;

use crate::idfilter::GeneratedIdFilter;
use crate::locator::{Locator, CSS_PREFIX};
use crate::selector::{attr_equals, escape_ident, query_all};
use crate::view::{DocumentView, NodeId};

/// Test hooks checked before anything else, in this order.
pub const TEST_ATTRIBUTES: &[&str] = &["data-testid", "data-cy", "data-e2e", "data-test", "data-qa"];

/// Semantic data attributes, checked after the form-field attributes.
pub const SEMANTIC_ATTRIBUTES: &[&str] =
    &["data-component", "data-element", "data-target", "data-action"];

const FORM_CONTROL_TAGS: &[&str] = &["input", "textarea", "select", "button"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentifyError {
    #[error("no interactive element at or above the picked node")]
    NoInteractiveAncestor,
}

/// Synthesis result. `locator` is `None` when every strategy failed; the
/// description still tells the user what was picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    pub locator: Option<Locator>,
    pub strategy: Option<&'static str>,
    pub description: String,
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, view: &dyn DocumentView, node: NodeId) -> Option<Locator>;
}

/// Shared uniqueness probe: an attribute value backs a locator only when
/// its equality selector resolves to exactly the probed element.
pub fn unique_attr(view: &dyn DocumentView, node: NodeId, attr: &str) -> Option<Locator> {
    let value = view.attribute(node, attr)?;
    if value.trim().is_empty() {
        return None;
    }
    let selector = attr_equals(attr, &value);
    match query_all(view, &selector) {
        Ok(found) if found == [node] => Some(Locator::Css(selector)),
        _ => None,
    }
}

struct AriaLabel;

impl Strategy for AriaLabel {
    fn name(&self) -> &'static str {
        "aria-label"
    }

    fn attempt(&self, view: &dyn DocumentView, node: NodeId) -> Option<Locator> {
        unique_attr(view, node, "aria-label")
    }
}

struct ElementId {
    filter: GeneratedIdFilter,
}

impl Strategy for ElementId {
    fn name(&self) -> &'static str {
        "element-id"
    }

    fn attempt(&self, view: &dyn DocumentView, node: NodeId) -> Option<Locator> {
        let id = view.attribute(node, "id")?;
        if id.trim().is_empty() || id.starts_with(CSS_PREFIX) {
            return None;
        }
        if self.filter.rejects(&id).is_some() {
            return None;
        }
        // Ids resolve first-match, so the element must both be that first
        // match and the only carrier of the id.
        match query_all(view, &attr_equals("id", &id)) {
            Ok(found) if found == [node] && view.element_by_id(&id) == Some(node) => {
                Some(Locator::Id(id))
            }
            _ => None,
        }
    }
}

struct AttrList {
    strategy_name: &'static str,
    attrs: &'static [&'static str],
}

impl Strategy for AttrList {
    fn name(&self) -> &'static str {
        self.strategy_name
    }

    fn attempt(&self, view: &dyn DocumentView, node: NodeId) -> Option<Locator> {
        self.attrs
            .iter()
            .find_map(|attr| unique_attr(view, node, attr))
    }
}

struct TaggedAttr {
    strategy_name: &'static str,
    attr: &'static str,
    tags: &'static [&'static str],
}

impl Strategy for TaggedAttr {
    fn name(&self) -> &'static str {
        self.strategy_name
    }

    fn attempt(&self, view: &dyn DocumentView, node: NodeId) -> Option<Locator> {
        let tag = view.tag_name(node)?;
        if !self.tags.contains(&tag.as_str()) {
            return None;
        }
        unique_attr(view, node, self.attr)
    }
}

struct StableClasses;

impl StableClasses {
    fn is_stable(class: &str) -> bool {
        class.chars().count() > 1
            && !class.starts_with('_')
            && !class.chars().any(|c| c.is_ascii_digit())
            && !class.contains(':')
    }
}

impl Strategy for StableClasses {
    fn name(&self) -> &'static str {
        "stable-classes"
    }

    fn attempt(&self, view: &dyn DocumentView, node: NodeId) -> Option<Locator> {
        let stable: Vec<String> = view
            .classes(node)
            .into_iter()
            .filter(|c| Self::is_stable(c))
            .collect();
        if stable.is_empty() {
            return None;
        }
        let selector: String = stable
            .iter()
            .map(|c| format!(".{}", escape_ident(c)))
            .collect();
        match query_all(view, &selector) {
            Ok(found) if found == [node] => Some(Locator::Css(selector)),
            _ => None,
        }
    }
}

pub struct Synthesizer {
    strategies: Vec<Box<dyn Strategy>>,
}

impl Synthesizer {
    pub fn new() -> Synthesizer {
        Synthesizer::with_id_filter(GeneratedIdFilter::default())
    }

    pub fn with_id_filter(filter: GeneratedIdFilter) -> Synthesizer {
        Synthesizer {
            strategies: vec![
                Box::new(AriaLabel),
                Box::new(ElementId { filter }),
                Box::new(AttrList {
                    strategy_name: "test-attribute",
                    attrs: TEST_ATTRIBUTES,
                }),
                Box::new(TaggedAttr {
                    strategy_name: "name",
                    attr: "name",
                    tags: FORM_CONTROL_TAGS,
                }),
                Box::new(TaggedAttr {
                    strategy_name: "placeholder",
                    attr: "placeholder",
                    tags: &["input", "textarea"],
                }),
                Box::new(AttrList {
                    strategy_name: "semantic-attribute",
                    attrs: SEMANTIC_ATTRIBUTES,
                }),
                Box::new(StableClasses),
            ],
        }
    }

    /// Custom cascade; order is priority order.
    pub fn custom(strategies: Vec<Box<dyn Strategy>>) -> Synthesizer {
        Synthesizer { strategies }
    }

    pub fn identify(
        &self,
        view: &dyn DocumentView,
        picked: NodeId,
    ) -> Result<Synthesized, IdentifyError> {
        let node =
            interactive_ancestor(view, picked).ok_or(IdentifyError::NoInteractiveAncestor)?;
        let description = describe(view, node);
        for strategy in &self.strategies {
            if let Some(locator) = strategy.attempt(view, node) {
                return Ok(Synthesized {
                    locator: Some(locator),
                    strategy: Some(strategy.name()),
                    description,
                });
            }
        }
        Ok(Synthesized {
            locator: None,
            strategy: None,
            description,
        })
    }
}

impl Default for Synthesizer {
    fn default() -> Synthesizer {
        Synthesizer::new()
    }
}

/// One-shot synthesis with the default cascade.
pub fn synthesize(view: &dyn DocumentView, picked: NodeId) -> Result<Synthesized, IdentifyError> {
    Synthesizer::new().identify(view, picked)
}

/// Nearest element at or above `node` a user can interact with.
pub fn interactive_ancestor(view: &dyn DocumentView, node: NodeId) -> Option<NodeId> {
    let mut current = Some(node);
    while let Some(candidate) = current {
        if is_interactive(view, candidate) {
            return Some(candidate);
        }
        current = view.parent(candidate);
    }
    None
}

fn is_interactive(view: &dyn DocumentView, node: NodeId) -> bool {
    let tag = match view.tag_name(node) {
        Some(tag) => tag,
        None => return false,
    };
    match tag.as_str() {
        "input" => view
            .attribute(node, "type")
            .map(|t| !t.eq_ignore_ascii_case("hidden"))
            .unwrap_or(true),
        "textarea" | "button" | "select" | "a" => true,
        _ => {
            view.attribute(node, "role")
                .map(|r| r.eq_ignore_ascii_case("button"))
                .unwrap_or(false)
                || view.is_content_editable(node)
        }
    }
}

/// Display-only element description shown when a locator is offered or
/// when synthesis fails.
pub fn describe(view: &dyn DocumentView, node: NodeId) -> String {
    let tag = match view.tag_name(node) {
        Some(tag) => tag,
        None => return "detached element".to_string(),
    };
    if let Some(label) = nonempty(view.attribute(node, "aria-label")) {
        return format!("{tag} \"{}\"", snippet(&label));
    }
    let text = view.text_content(node);
    if !text.trim().is_empty() {
        return format!("{tag} \"{}\"", snippet(&text));
    }
    if let Some(placeholder) = nonempty(view.attribute(node, "placeholder")) {
        return format!("{tag} (placeholder \"{}\")", snippet(&placeholder));
    }
    if let Some(name) = nonempty(view.attribute(node, "name")) {
        return format!("{tag} (name \"{}\")", snippet(&name));
    }
    if let Some(id) = nonempty(view.attribute(node, "id")) {
        return format!("{tag}#{id}");
    }
    tag
}

fn nonempty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn snippet(text: &str) -> String {
    let collapsed: Vec<&str> = text.split_whitespace().collect();
    let joined = collapsed.join(" ");
    if joined.chars().count() > 40 {
        let cut: String = joined.chars().take(40).collect();
        format!("{cut}...")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeDoc {
        elements: Vec<FakeElement>,
    }

    struct FakeElement {
        tag: String,
        attrs: HashMap<String, String>,
        parent: Option<NodeId>,
        text: String,
    }

    impl FakeDoc {
        fn new() -> FakeDoc {
            FakeDoc {
                elements: Vec::new(),
            }
        }

        fn add(&mut self, tag: &str, attrs: &[(&str, &str)], parent: Option<NodeId>) -> NodeId {
            self.add_text(tag, attrs, parent, "")
        }

        fn add_text(
            &mut self,
            tag: &str,
            attrs: &[(&str, &str)],
            parent: Option<NodeId>,
            text: &str,
        ) -> NodeId {
            self.elements.push(FakeElement {
                tag: tag.to_string(),
                attrs: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                parent,
                text: text.to_string(),
            });
            (self.elements.len() - 1) as NodeId
        }
    }

    impl DocumentView for FakeDoc {
        fn nodes(&self) -> Vec<NodeId> {
            (0..self.elements.len() as NodeId).collect()
        }

        fn tag_name(&self, node: NodeId) -> Option<String> {
            self.elements.get(node as usize).map(|e| e.tag.clone())
        }

        fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
            self.elements.get(node as usize)?.attrs.get(name).cloned()
        }

        fn parent(&self, node: NodeId) -> Option<NodeId> {
            self.elements.get(node as usize)?.parent
        }

        fn text_content(&self, node: NodeId) -> String {
            self.elements
                .get(node as usize)
                .map(|e| e.text.clone())
                .unwrap_or_default()
        }
    }

    #[test]
    fn aria_label_outranks_id() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let input = doc.add(
            "input",
            &[("aria-label", "Search"), ("id", "search-box")],
            Some(body),
        );
        let result = synthesize(&doc, input).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css("[aria-label=\"Search\"]".to_string()))
        );
        assert_eq!(result.strategy, Some("aria-label"));
    }

    #[test]
    fn duplicate_aria_label_falls_through_to_id() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let first = doc.add(
            "input",
            &[("aria-label", "Search"), ("id", "search-box")],
            Some(body),
        );
        doc.add("input", &[("aria-label", "Search")], Some(body));
        let result = synthesize(&doc, first).unwrap();
        assert_eq!(result.locator, Some(Locator::Id("search-box".to_string())));
        assert_eq!(result.strategy, Some("element-id"));
    }

    #[test]
    fn generated_id_falls_through_to_test_attribute() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let input = doc.add(
            "input",
            &[("id", "ember417"), ("data-testid", "email-field")],
            Some(body),
        );
        let result = synthesize(&doc, input).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css("[data-testid=\"email-field\"]".to_string()))
        );
        assert_eq!(result.strategy, Some("test-attribute"));
    }

    #[test]
    fn reserved_prefix_id_is_never_emitted() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let input = doc.add(
            "input",
            &[("id", "css:sneaky"), ("name", "mail")],
            Some(body),
        );
        let result = synthesize(&doc, input).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css("[name=\"mail\"]".to_string()))
        );
    }

    #[test]
    fn duplicated_id_is_rejected() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        doc.add("input", &[("id", "login")], Some(body));
        let second = doc.add(
            "input",
            &[("id", "login"), ("placeholder", "Email address")],
            Some(body),
        );
        let result = synthesize(&doc, second).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css("[placeholder=\"Email address\"]".to_string()))
        );
    }

    #[test]
    fn name_applies_to_form_controls_only() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let div = doc.add(
            "div",
            &[("name", "panel"), ("role", "button"), ("class", "side-panel")],
            Some(body),
        );
        let result = synthesize(&doc, div).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css(".side-panel".to_string())),
            "div name must not be used"
        );
    }

    #[test]
    fn placeholder_applies_to_text_fields_only() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let select = doc.add(
            "select",
            &[("placeholder", "Pick one"), ("data-component", "country")],
            Some(body),
        );
        let result = synthesize(&doc, select).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css("[data-component=\"country\"]".to_string()))
        );
        assert_eq!(result.strategy, Some("semantic-attribute"));
    }

    #[test]
    fn semantic_attributes_follow_declared_order() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let widget = doc.add(
            "div",
            &[
                ("role", "button"),
                ("data-action", "open"),
                ("data-element", "drawer"),
            ],
            Some(body),
        );
        let result = synthesize(&doc, widget).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css("[data-element=\"drawer\"]".to_string()))
        );
    }

    #[test]
    fn stable_classes_filter_generated_ones() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let button = doc.add(
            "button",
            &[("class", "btn css-1x2y3z _private submit-action x")],
            Some(body),
        );
        let result = synthesize(&doc, button).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css(".btn.submit-action".to_string()))
        );
        assert_eq!(result.strategy, Some("stable-classes"));
    }

    #[test]
    fn ambiguous_stable_classes_fail() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let first = doc.add_text("button", &[("class", "btn")], Some(body), "Save");
        doc.add("button", &[("class", "btn")], Some(body));
        let result = synthesize(&doc, first).unwrap();
        assert_eq!(result.locator, None);
        assert_eq!(result.strategy, None);
        assert_eq!(result.description, "button \"Save\"");
    }

    #[test]
    fn picked_node_widens_to_interactive_ancestor() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let button = doc.add(
            "button",
            &[("aria-label", "Submit order")],
            Some(body),
        );
        let icon = doc.add("span", &[("class", "icon")], Some(button));
        let result = synthesize(&doc, icon).unwrap();
        assert_eq!(
            result.locator,
            Some(Locator::Css("[aria-label=\"Submit order\"]".to_string()))
        );
    }

    #[test]
    fn hidden_input_is_not_interactive() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let hidden = doc.add("input", &[("type", "hidden")], Some(body));
        assert_eq!(
            synthesize(&doc, hidden),
            Err(IdentifyError::NoInteractiveAncestor)
        );
    }

    #[test]
    fn plain_markup_has_no_interactive_ancestor() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let p = doc.add("p", &[], Some(body));
        assert_eq!(
            synthesize(&doc, p),
            Err(IdentifyError::NoInteractiveAncestor)
        );
    }

    #[test]
    fn synthesized_locator_resolves_back_to_the_element() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let form = doc.add("form", &[("class", "login-form")], Some(body));
        let email = doc.add(
            "input",
            &[("name", "email"), ("type", "email")],
            Some(form),
        );
        let result = synthesize(&doc, email).unwrap();
        let encoded = result.locator.clone().unwrap().encode();
        let resolved = match Locator::parse(&encoded) {
            Locator::Id(id) => doc.element_by_id(&id),
            Locator::Css(sel) => {
                let found = query_all(&doc, &sel).unwrap();
                assert_eq!(found.len(), 1);
                found.first().copied()
            }
        };
        assert_eq!(resolved, Some(email));
    }

    #[test]
    fn quotes_in_attribute_values_are_escaped() {
        let mut doc = FakeDoc::new();
        let body = doc.add("body", &[], None);
        let input = doc.add(
            "input",
            &[("aria-label", "Find \"quoted\" things")],
            Some(body),
        );
        let result = synthesize(&doc, input).unwrap();
        let locator = result.locator.unwrap();
        match &locator {
            Locator::Css(sel) => {
                assert_eq!(query_all(&doc, sel).unwrap(), vec![input]);
            }
            other => panic!("expected css locator, got {other:?}"),
        }
    }
}
