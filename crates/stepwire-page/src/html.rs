//! HTML import. Pages and fragments come in through `scraper`; the parsed
//! tree is copied into the arena, dropping comments and doctypes and
//! keeping attribute order.

use ego_tree::NodeRef;
use scraper::{Html, Node as HtmlNode};
use stepwire_core::NodeId;

use crate::document::PageDocument;

/// Parses a full page. The root is the `<html>` element the parser
/// guarantees.
pub fn parse_document(html: &str) -> PageDocument {
    let parsed = Html::parse_document(html);
    let mut doc = PageDocument::new();
    import_children(&mut doc, None, parsed.tree.root());
    doc
}

/// Parses a fragment and appends its top-level nodes under `parent`.
pub fn append_fragment(doc: &mut PageDocument, parent: NodeId, html: &str) {
    let parsed = Html::parse_fragment(html);
    import_children(doc, Some(parent), *parsed.root_element());
}

fn import_children(
    doc: &mut PageDocument,
    parent: Option<NodeId>,
    node: NodeRef<'_, HtmlNode>,
) {
    for child in node.children() {
        match child.value() {
            HtmlNode::Element(element) => {
                let attrs = element
                    .attrs()
                    .map(|(name, value)| (name.to_string(), value.to_string()));
                let id = doc.create_element(element.name(), attrs);
                match parent {
                    Some(parent) => doc.append_child(parent, id),
                    None => doc.set_root(id),
                }
                import_children(doc, Some(id), child);
            }
            HtmlNode::Text(text) => {
                let content: &str = &text.text;
                if let Some(parent) = parent {
                    if !content.trim().is_empty() {
                        let run = doc.create_text(content);
                        doc.append_child(parent, run);
                    }
                }
            }
            _ => {}
        }
    }
}
