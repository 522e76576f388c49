//! In-memory page host. `SimSession` owns one loaded document at a time,
//! implements the engine's `PageSession` trait against it and records every
//! mutation and synthetic event in order, so tests and the CLI can assert
//! on exactly what a replay did to the page.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use stepwire_core::selector::query_all;
use stepwire_core::synthesize::describe;
use stepwire_core::{DocumentView, Locator, NodeId};
use stepwire_engine::session::{
    ElementFacts, PageSession, SelectOption, SessionError, SyntheticEvent,
};
use tokio::sync::watch;
use tracing::debug;

use crate::document::PageDocument;
use crate::html::{append_fragment, parse_document};

/// One recorded page mutation or dispatched event, in occurrence order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum Activity {
    ValueSet { node: NodeId, value: String },
    TextSet { node: NodeId, text: String },
    OptionChosen { node: NodeId, index: usize },
    Event { node: NodeId, event: SyntheticEvent },
    Clicked { node: NodeId },
    Navigated { url: String },
}

struct Page {
    url: String,
    doc: PageDocument,
    replay_claimed: bool,
}

#[derive(Default)]
struct State {
    page: Option<Page>,
    /// url -> html, consulted by `navigate`.
    registered: HashMap<String, String>,
    activities: Vec<Activity>,
}

pub struct SimSession {
    state: Mutex<State>,
    changes_tx: watch::Sender<u64>,
}

impl SimSession {
    pub fn new() -> SimSession {
        let (changes_tx, _) = watch::channel(0);
        SimSession {
            state: Mutex::new(State::default()),
            changes_tx,
        }
    }

    /// Parses `html` and makes it the current page. A fresh load resets the
    /// replay guard; the activity log is kept across loads.
    pub fn load(&self, url: &str, html: &str) {
        let doc = parse_document(html);
        {
            let mut state = self.state.lock().unwrap();
            state.page = Some(Page {
                url: url.to_string(),
                doc,
                replay_claimed: false,
            });
        }
        debug!(url, "page loaded");
        self.notify();
    }

    /// Registers a page `navigate` can load later.
    pub fn register_page(&self, url: &str, html: &str) {
        self.state
            .lock()
            .unwrap()
            .registered
            .insert(url.to_string(), html.to_string());
    }

    /// Synchronous selector lookup, first match in document order. Used by
    /// capture flows and tests; replay goes through `find`.
    pub fn find_now(&self, selector: &str) -> Result<Option<NodeId>, SessionError> {
        let state = self.state.lock().unwrap();
        let page = state.page.as_ref().ok_or(SessionError::NotReady)?;
        match query_all(&page.doc, selector) {
            Ok(found) => Ok(found.into_iter().next()),
            Err(error) => Err(SessionError::InvalidSelector {
                selector: selector.to_string(),
                reason: error.to_string(),
            }),
        }
    }

    /// Appends parsed HTML under an existing element and signals the
    /// structural change, the way client-side rendering inserts content.
    pub fn append_html(&self, parent: NodeId, html: &str) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().unwrap();
            let page = state.page.as_mut().ok_or(SessionError::NotReady)?;
            if !page.doc.is_attached(parent) {
                return Err(SessionError::Stale { node: parent });
            }
            append_fragment(&mut page.doc, parent, html);
        }
        self.notify();
        Ok(())
    }

    /// Removes an element from the page and signals the structural change.
    pub fn remove(&self, node: NodeId) -> Result<(), SessionError> {
        {
            let mut state = self.state.lock().unwrap();
            let page = state.page.as_mut().ok_or(SessionError::NotReady)?;
            page.doc.detach(node);
        }
        self.notify();
        Ok(())
    }

    /// Read access to the current document, for capture-time synthesis.
    pub fn with_document<R>(&self, f: impl FnOnce(&PageDocument) -> R) -> Result<R, SessionError> {
        let state = self.state.lock().unwrap();
        let page = state.page.as_ref().ok_or(SessionError::NotReady)?;
        Ok(f(&page.doc))
    }

    pub fn value_of(&self, node: NodeId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.page.as_ref().and_then(|page| page.doc.value(node))
    }

    pub fn text_of(&self, node: NodeId) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .page
            .as_ref()
            .filter(|page| page.doc.is_element(node))
            .map(|page| page.doc.text_content(node))
    }

    /// Everything replay did to the page, in order.
    pub fn activities(&self) -> Vec<Activity> {
        self.state.lock().unwrap().activities.clone()
    }

    fn record(&self, activity: Activity) {
        self.state.lock().unwrap().activities.push(activity);
    }

    fn notify(&self) {
        self.changes_tx.send_modify(|generation| *generation += 1);
    }

    /// Runs `f` on an attached element, with the stale/missing checks the
    /// trait methods share.
    fn with_attached<R>(
        &self,
        node: NodeId,
        f: impl FnOnce(&mut PageDocument) -> R,
    ) -> Result<R, SessionError> {
        let mut state = self.state.lock().unwrap();
        let page = state.page.as_mut().ok_or(SessionError::NotReady)?;
        if !page.doc.is_attached(node) || !page.doc.is_element(node) {
            return Err(SessionError::Stale { node });
        }
        Ok(f(&mut page.doc))
    }
}

impl Default for SimSession {
    fn default() -> SimSession {
        SimSession::new()
    }
}

#[async_trait]
impl PageSession for SimSession {
    async fn find(&self, locator: &Locator) -> Result<Option<NodeId>, SessionError> {
        let state = self.state.lock().unwrap();
        let page = state.page.as_ref().ok_or(SessionError::NotReady)?;
        match locator {
            Locator::Id(id) => Ok(page.doc.element_by_id(id)),
            Locator::Css(selector) => match query_all(&page.doc, selector) {
                Ok(found) => Ok(found.into_iter().next()),
                Err(error) => Err(SessionError::InvalidSelector {
                    selector: selector.clone(),
                    reason: error.to_string(),
                }),
            },
        }
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes_tx.subscribe()
    }

    fn try_begin_replay(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.page.as_mut() {
            Some(page) if !page.replay_claimed => {
                page.replay_claimed = true;
                true
            }
            _ => false,
        }
    }

    async fn is_attached(&self, node: NodeId) -> Result<bool, SessionError> {
        let state = self.state.lock().unwrap();
        let page = state.page.as_ref().ok_or(SessionError::NotReady)?;
        Ok(page.doc.is_attached(node))
    }

    async fn facts(&self, node: NodeId) -> Result<ElementFacts, SessionError> {
        self.with_attached(node, |doc| {
            let tag = doc.tag_name(node).unwrap_or_default();
            let input_type = if tag == "input" {
                doc.attribute(node, "type").map(|t| t.to_lowercase())
            } else {
                None
            };
            ElementFacts {
                input_type,
                role: doc.attribute(node, "role"),
                content_editable: doc.is_content_editable(node),
                tag,
            }
        })
    }

    async fn describe(&self, node: NodeId) -> Result<String, SessionError> {
        self.with_document(|doc| describe(doc, node))
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), SessionError> {
        self.with_attached(node, |doc| doc.set_value(node, value))?;
        self.record(Activity::ValueSet {
            node,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn set_text(&self, node: NodeId, text: &str) -> Result<(), SessionError> {
        self.with_attached(node, |doc| doc.set_text(node, text))?;
        self.record(Activity::TextSet {
            node,
            text: text.to_string(),
        });
        // Replacing the text runs is a child-list mutation.
        self.notify();
        Ok(())
    }

    async fn options(&self, node: NodeId) -> Result<Vec<SelectOption>, SessionError> {
        self.with_attached(node, |doc| {
            doc.option_nodes(node)
                .into_iter()
                .map(|option| {
                    let text = doc.text_content(option).trim().to_string();
                    SelectOption {
                        value: doc.value(option).unwrap_or_else(|| text.clone()),
                        selected: doc.is_selected(option),
                        text,
                    }
                })
                .collect()
        })
    }

    async fn choose_option(&self, node: NodeId, index: usize) -> Result<(), SessionError> {
        self.with_attached(node, |doc| {
            let options = doc.option_nodes(node);
            let chosen = *options
                .get(index)
                .ok_or(SessionError::Activation(format!(
                    "select has no option at index {index}"
                )))?;
            for option in &options {
                doc.set_selected(*option, *option == chosen);
            }
            // Same fallback as `options`: a value-less option is worth its
            // trimmed text.
            let value = doc
                .value(chosen)
                .unwrap_or_else(|| doc.text_content(chosen).trim().to_string());
            doc.set_value(node, &value);
            Ok(())
        })??;
        self.record(Activity::OptionChosen { node, index });
        Ok(())
    }

    async fn dispatch(&self, node: NodeId, event: SyntheticEvent) -> Result<(), SessionError> {
        debug!(node, kind = ?event.kind, "dispatching synthetic event");
        self.record(Activity::Event { node, event });
        Ok(())
    }

    async fn click(&self, node: NodeId) -> Result<(), SessionError> {
        let attached = self.is_attached(node).await?;
        if !attached {
            return Err(SessionError::Stale { node });
        }
        self.record(Activity::Clicked { node });
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), SessionError> {
        let html = {
            let state = self.state.lock().unwrap();
            state.registered.get(url).cloned()
        }
        .ok_or_else(|| SessionError::Navigation(format!("no page registered for {url}")))?;
        self.load(url, &html);
        self.record(Activity::Navigated {
            url: url.to_string(),
        });
        Ok(())
    }

    async fn url(&self) -> Result<String, SessionError> {
        let state = self.state.lock().unwrap();
        let page = state.page.as_ref().ok_or(SessionError::NotReady)?;
        Ok(page.url.clone())
    }
}
