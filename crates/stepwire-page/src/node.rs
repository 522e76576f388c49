use stepwire_core::NodeId;

/// One arena slot: an element or a run of character data.
#[derive(Debug, Clone)]
pub(crate) enum NodeKind {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
pub(crate) struct ElementData {
    /// Lowercase tag name.
    pub tag: String,
    /// Attributes in source order, names as parsed (lowercase for HTML).
    pub attrs: Vec<(String, String)>,
    /// Runtime value, set by injection. Shadows the `value` attribute the
    /// way a DOM property shadows its content attribute.
    pub value: Option<String>,
    /// Runtime selection flag for `<option>` elements. `None` means the
    /// markup decides (`selected` attribute present or not).
    pub selected: Option<bool>,
}

impl ElementData {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn element(&self) -> Option<&ElementData> {
        match &self.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }
}
