//! Arena-backed element tree. Handles are indices and are never reused, so
//! a detached element keeps its id and can still be inspected; it simply
//! stops being reachable from the root. Mutation here is silent — the
//! session layer decides which mutations count as structural changes and
//! notifies the waiters.

use stepwire_core::{DocumentView, NodeId};

use crate::node::{ElementData, Node, NodeKind};

#[derive(Debug, Clone, Default)]
pub struct PageDocument {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl PageDocument {
    pub fn new() -> PageDocument {
        PageDocument::default()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// New detached element. Tag is normalized to lowercase.
    pub fn create_element<I>(&mut self, tag: &str, attrs: I) -> NodeId
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.push(NodeKind::Element(ElementData {
            tag: tag.to_lowercase(),
            attrs: attrs.into_iter().collect(),
            value: None,
            selected: None,
        }))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
        });
        (self.nodes.len() - 1) as NodeId
    }

    /// Makes `node` the document root. A previous root becomes detached.
    pub fn set_root(&mut self, node: NodeId) {
        self.root = Some(node);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if self.nodes.get(parent as usize).is_none() || self.nodes.get(child as usize).is_none() {
            return;
        }
        if let Some(old_parent) = self.nodes[child as usize].parent {
            self.nodes[old_parent as usize]
                .children
                .retain(|&c| c != child);
        }
        self.nodes[child as usize].parent = Some(parent);
        self.nodes[parent as usize].children.push(child);
    }

    /// Unlinks `node` from its parent. The subtree keeps its internal
    /// structure but is no longer reachable from the root.
    pub fn detach(&mut self, node: NodeId) {
        if self.root == Some(node) {
            self.root = None;
        }
        let parent = match self.nodes.get(node as usize).and_then(|n| n.parent) {
            Some(parent) => parent,
            None => return,
        };
        self.nodes[parent as usize].children.retain(|&c| c != node);
        self.nodes[node as usize].parent = None;
    }

    /// Reachable from the root through parent links.
    pub fn is_attached(&self, node: NodeId) -> bool {
        if self.nodes.get(node as usize).is_none() {
            return false;
        }
        let mut current = node;
        loop {
            if Some(current) == self.root {
                return true;
            }
            match self.nodes[current as usize].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.element(node).is_some()
    }

    fn element(&self, node: NodeId) -> Option<&ElementData> {
        self.nodes.get(node as usize)?.element()
    }

    /// Replaces the children with a single text run.
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        if !self.is_element(node) {
            return;
        }
        for child in std::mem::take(&mut self.nodes[node as usize].children) {
            self.nodes[child as usize].parent = None;
        }
        let run = self.create_text(text);
        self.append_child(node, run);
    }

    /// Runtime value: what injection wrote, falling back to the `value`
    /// attribute from the markup.
    pub fn value(&self, node: NodeId) -> Option<String> {
        let data = self.element(node)?;
        data.value
            .clone()
            .or_else(|| data.attribute("value").map(str::to_string))
    }

    pub fn set_value(&mut self, node: NodeId, value: &str) {
        if let Some(data) = self.nodes.get_mut(node as usize).and_then(Node::element_mut) {
            data.value = Some(value.to_string());
        }
    }

    pub fn is_selected(&self, node: NodeId) -> bool {
        match self.element(node) {
            Some(data) => data
                .selected
                .unwrap_or_else(|| data.attribute("selected").is_some()),
            None => false,
        }
    }

    pub fn set_selected(&mut self, node: NodeId, selected: bool) {
        if let Some(data) = self.nodes.get_mut(node as usize).and_then(Node::element_mut) {
            data.selected = Some(selected);
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.nodes.get_mut(node as usize).and_then(Node::element_mut) {
            match data.attrs.iter_mut().find(|(attr, _)| attr == name) {
                Some((_, existing)) => *existing = value.to_string(),
                None => data.attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    /// `<option>` descendants of a select, document order.
    pub fn option_nodes(&self, select: NodeId) -> Vec<NodeId> {
        let mut options = Vec::new();
        self.walk_subtree(select, &mut |doc, node| {
            if node != select && doc.element(node).map(|d| d.tag.as_str()) == Some("option") {
                options.push(node);
            }
        });
        options
    }

    fn walk_subtree(&self, from: NodeId, visit: &mut impl FnMut(&PageDocument, NodeId)) {
        if self.nodes.get(from as usize).is_none() {
            return;
        }
        visit(self, from);
        // children is cloned so the closure can borrow the document.
        for child in self.nodes[from as usize].children.clone() {
            self.walk_subtree(child, visit);
        }
    }
}

impl DocumentView for PageDocument {
    fn nodes(&self) -> Vec<NodeId> {
        let mut elements = Vec::new();
        if let Some(root) = self.root {
            self.walk_subtree(root, &mut |doc, node| {
                if doc.is_element(node) {
                    elements.push(node);
                }
            });
        }
        elements
    }

    fn tag_name(&self, node: NodeId) -> Option<String> {
        Some(self.element(node)?.tag.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.attribute(name).map(str::to_string)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node as usize)?.parent
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut text = String::new();
        self.walk_subtree(node, &mut |doc, current| {
            if let Some(Node {
                kind: NodeKind::Text(run),
                ..
            }) = doc.nodes.get(current as usize)
            {
                text.push_str(run);
            }
        });
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_inputs() -> (PageDocument, NodeId, NodeId, NodeId) {
        let mut doc = PageDocument::new();
        let body = doc.create_element("body", []);
        doc.set_root(body);
        let first = doc.create_element("input", [("id".to_string(), "a".to_string())]);
        let second = doc.create_element("input", [("id".to_string(), "b".to_string())]);
        doc.append_child(body, first);
        doc.append_child(body, second);
        (doc, body, first, second)
    }

    #[test]
    fn nodes_are_document_order_elements_only() {
        let (mut doc, body, first, second) = two_inputs();
        let text = doc.create_text("hello");
        doc.append_child(body, text);
        assert_eq!(doc.nodes(), vec![body, first, second]);
    }

    #[test]
    fn detach_hides_the_subtree_but_keeps_the_handle() {
        let (mut doc, _, first, second) = two_inputs();
        doc.detach(first);
        assert!(!doc.is_attached(first));
        assert!(doc.is_attached(second));
        assert_eq!(doc.tag_name(first).as_deref(), Some("input"));
        assert_eq!(doc.nodes().len(), 2);
        assert_eq!(doc.element_by_id("a"), None);
    }

    #[test]
    fn runtime_value_shadows_the_attribute() {
        let mut doc = PageDocument::new();
        let body = doc.create_element("body", []);
        doc.set_root(body);
        let input = doc.create_element(
            "input",
            [("value".to_string(), "initial".to_string())],
        );
        doc.append_child(body, input);
        assert_eq!(doc.value(input).as_deref(), Some("initial"));
        doc.set_value(input, "typed");
        assert_eq!(doc.value(input).as_deref(), Some("typed"));
        // The content attribute is untouched.
        assert_eq!(doc.attribute(input, "value").as_deref(), Some("initial"));
    }

    #[test]
    fn set_text_replaces_existing_runs() {
        let mut doc = PageDocument::new();
        let div = doc.create_element("div", []);
        doc.set_root(div);
        let old = doc.create_text("before");
        doc.append_child(div, old);
        doc.set_text(div, "after");
        assert_eq!(doc.text_content(div), "after");
    }

    #[test]
    fn option_nodes_and_selection_state() {
        let mut doc = PageDocument::new();
        let select = doc.create_element("select", []);
        doc.set_root(select);
        let us = doc.create_element(
            "option",
            [
                ("value".to_string(), "US".to_string()),
                ("selected".to_string(), String::new()),
            ],
        );
        let ca = doc.create_element("option", [("value".to_string(), "CA".to_string())]);
        doc.append_child(select, us);
        doc.append_child(select, ca);

        assert_eq!(doc.option_nodes(select), vec![us, ca]);
        assert!(doc.is_selected(us));
        assert!(!doc.is_selected(ca));

        doc.set_selected(us, false);
        doc.set_selected(ca, true);
        assert!(!doc.is_selected(us));
        assert!(doc.is_selected(ca));
    }

    #[test]
    fn text_content_concatenates_descendants() {
        let mut doc = PageDocument::new();
        let button = doc.create_element("button", []);
        doc.set_root(button);
        let span = doc.create_element("span", []);
        let icon_text = doc.create_text("Save ");
        let rest = doc.create_text("now");
        doc.append_child(button, span);
        doc.append_child(span, icon_text);
        doc.append_child(button, rest);
        assert_eq!(doc.text_content(button), "Save now");
    }
}
