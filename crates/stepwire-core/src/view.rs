/// Element handle inside one document. Handles are never reused within a
/// page session, so detached elements keep their id.
pub type NodeId = u32;

/// Read access to a document tree, implemented by page hosts.
///
/// The selector matcher and the synthesizer run entirely on top of this
/// trait. Implementations normalize tag names to lowercase and return
/// elements in document order from `nodes`.
pub trait DocumentView {
    /// All element handles, document order.
    fn nodes(&self) -> Vec<NodeId>;

    /// Lowercase tag name, `None` for a stale handle.
    fn tag_name(&self, node: NodeId) -> Option<String>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Concatenated descendant text.
    fn text_content(&self, node: NodeId) -> String;

    /// Whitespace-split `class` attribute.
    fn classes(&self, node: NodeId) -> Vec<String> {
        self.attribute(node, "class")
            .map(|value| value.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// `contenteditable` present and not explicitly off.
    fn is_content_editable(&self, node: NodeId) -> bool {
        match self.attribute(node, "contenteditable") {
            Some(value) => !value.eq_ignore_ascii_case("false"),
            None => false,
        }
    }

    /// First element in document order carrying this exact id.
    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.nodes()
            .into_iter()
            .find(|&node| self.attribute(node, "id").as_deref() == Some(id))
    }
}
