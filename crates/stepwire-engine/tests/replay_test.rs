use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use stepwire_core::selector::SelectorList;
use stepwire_core::{Locator, NodeId};
use stepwire_engine::replay::{ReplayController, ReplayOptions, StepOutcome};
use stepwire_engine::session::{
    ElementFacts, EventKind, PageSession, SelectOption, SessionError, SyntheticEvent,
};
use tokio::sync::watch;

#[derive(Default)]
struct MockState {
    elements: HashMap<String, MockElement>,
    detached: HashSet<NodeId>,
    values: HashMap<NodeId, String>,
    texts: HashMap<NodeId, String>,
    events: Vec<(NodeId, SyntheticEvent)>,
    clicks: Vec<NodeId>,
    chosen: Vec<(NodeId, usize)>,
}

struct MockElement {
    node: NodeId,
    facts: ElementFacts,
    options: Vec<SelectOption>,
}

struct MockSession {
    state: Mutex<MockState>,
    changes_tx: watch::Sender<u64>,
    replay_claimed: AtomicBool,
    reject_keyups: AtomicBool,
}

impl MockSession {
    fn new() -> Arc<MockSession> {
        let (changes_tx, _) = watch::channel(0);
        Arc::new(MockSession {
            state: Mutex::new(MockState::default()),
            changes_tx,
            replay_claimed: AtomicBool::new(false),
            reject_keyups: AtomicBool::new(false),
        })
    }

    /// Registers an element under the wire form of its locator and signals
    /// a structural change.
    fn add_element(&self, locator: &str, node: NodeId, facts: ElementFacts) {
        self.add_select(locator, node, facts, Vec::new());
    }

    fn add_select(
        &self,
        locator: &str,
        node: NodeId,
        facts: ElementFacts,
        options: Vec<SelectOption>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.elements.insert(
            locator.to_string(),
            MockElement {
                node,
                facts,
                options,
            },
        );
        drop(state);
        self.changes_tx.send_modify(|generation| *generation += 1);
    }

    fn detach(&self, node: NodeId) {
        self.state.lock().unwrap().detached.insert(node);
        self.changes_tx.send_modify(|generation| *generation += 1);
    }

    fn events(&self) -> Vec<(NodeId, SyntheticEvent)> {
        self.state.lock().unwrap().events.clone()
    }

    fn value_of(&self, node: NodeId) -> Option<String> {
        self.state.lock().unwrap().values.get(&node).cloned()
    }

    fn find_facts(&self, node: NodeId) -> Option<ElementFacts> {
        let state = self.state.lock().unwrap();
        state
            .elements
            .values()
            .find(|element| element.node == node)
            .map(|element| element.facts.clone())
    }
}

#[async_trait]
impl PageSession for MockSession {
    async fn find(&self, locator: &Locator) -> Result<Option<NodeId>, SessionError> {
        if let Locator::Css(selector) = locator {
            if let Err(error) = SelectorList::parse(selector) {
                return Err(SessionError::InvalidSelector {
                    selector: selector.clone(),
                    reason: error.to_string(),
                });
            }
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .elements
            .get(&locator.encode())
            .filter(|element| !state.detached.contains(&element.node))
            .map(|element| element.node))
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes_tx.subscribe()
    }

    fn try_begin_replay(&self) -> bool {
        !self.replay_claimed.swap(true, Ordering::SeqCst)
    }

    async fn is_attached(&self, node: NodeId) -> Result<bool, SessionError> {
        Ok(!self.state.lock().unwrap().detached.contains(&node))
    }

    async fn facts(&self, node: NodeId) -> Result<ElementFacts, SessionError> {
        self.find_facts(node)
            .ok_or(SessionError::Stale { node })
    }

    async fn set_value(&self, node: NodeId, value: &str) -> Result<(), SessionError> {
        self.state
            .lock()
            .unwrap()
            .values
            .insert(node, value.to_string());
        Ok(())
    }

    async fn set_text(&self, node: NodeId, text: &str) -> Result<(), SessionError> {
        self.state
            .lock()
            .unwrap()
            .texts
            .insert(node, text.to_string());
        Ok(())
    }

    async fn options(&self, node: NodeId) -> Result<Vec<SelectOption>, SessionError> {
        let state = self.state.lock().unwrap();
        state
            .elements
            .values()
            .find(|element| element.node == node)
            .map(|element| element.options.clone())
            .ok_or(SessionError::Stale { node })
    }

    async fn choose_option(&self, node: NodeId, index: usize) -> Result<(), SessionError> {
        self.state.lock().unwrap().chosen.push((node, index));
        Ok(())
    }

    async fn dispatch(&self, node: NodeId, event: SyntheticEvent) -> Result<(), SessionError> {
        if event.kind == EventKind::KeyUp && self.reject_keyups.load(Ordering::SeqCst) {
            return Err(SessionError::Activation("key-up rejected".into()));
        }
        self.state.lock().unwrap().events.push((node, event));
        Ok(())
    }

    async fn click(&self, node: NodeId) -> Result<(), SessionError> {
        self.state.lock().unwrap().clicks.push(node);
        Ok(())
    }
}

fn text_input() -> ElementFacts {
    ElementFacts {
        tag: "input".to_string(),
        input_type: Some("text".to_string()),
        role: None,
        content_editable: false,
    }
}

fn checkbox() -> ElementFacts {
    ElementFacts {
        tag: "input".to_string(),
        input_type: Some("checkbox".to_string()),
        role: None,
        content_editable: false,
    }
}

fn button() -> ElementFacts {
    ElementFacts {
        tag: "button".to_string(),
        input_type: None,
        role: None,
        content_editable: false,
    }
}

fn editable_div() -> ElementFacts {
    ElementFacts {
        tag: "div".to_string(),
        input_type: None,
        role: None,
        content_editable: true,
    }
}

fn select_facts() -> ElementFacts {
    ElementFacts {
        tag: "select".to_string(),
        input_type: None,
        role: None,
        content_editable: false,
    }
}

fn options(timeout_ms: u64) -> ReplayOptions {
    ReplayOptions {
        resolve_timeout: Duration::from_millis(timeout_ms),
        keyup_delay: Duration::from_millis(50),
    }
}

fn outcomes(summary: &stepwire_engine::replay::ReplaySummary) -> Vec<&StepOutcome> {
    summary.steps.iter().map(|step| &step.outcome).collect()
}

#[tokio::test(start_paused = true)]
async fn steps_wait_for_elements_inserted_later() {
    let session = MockSession::new();

    let inserter = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        inserter.add_element("first", 1, text_input());
        tokio::time::sleep(Duration::from_millis(200)).await;
        inserter.add_element("second", 2, text_input());
    });

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("first=alpha&second=beta").await;

    assert!(summary.ran);
    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::Injected { .. }, StepOutcome::Injected { .. }]
    ));
    assert_eq!(session.value_of(1).as_deref(), Some("alpha"));
    assert_eq!(session.value_of(2).as_deref(), Some("beta"));

    // Both injections landed in step order, each with input before change.
    let kinds: Vec<(NodeId, EventKind)> = session
        .events()
        .iter()
        .map(|(node, event)| (*node, event.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (1, EventKind::Input),
            (1, EventKind::Change),
            (2, EventKind::Input),
            (2, EventKind::Change),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn wait_step_delays_the_rest_of_the_sequence() {
    let session = MockSession::new();
    session.add_element("a", 1, text_input());
    session.add_element("b", 2, text_input());

    let started = tokio::time::Instant::now();
    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("a=1&wait=500ms&b=2").await;

    assert_eq!(started.elapsed(), Duration::from_millis(500));
    assert!(matches!(
        outcomes(&summary)[..],
        [
            StepOutcome::Injected { .. },
            StepOutcome::Waited { millis: 500 },
            StepOutcome::Injected { .. }
        ]
    ));
}

#[tokio::test(start_paused = true)]
async fn unparseable_wait_logs_and_continues_without_delay() {
    let session = MockSession::new();
    session.add_element("a", 1, text_input());

    let started = tokio::time::Instant::now();
    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("wait=fast&a=1").await;

    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::WaitIgnored { .. }, StepOutcome::Injected { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn press_enter_targets_the_last_injected_element() {
    let session = MockSession::new();
    session.add_element("q", 7, text_input());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("q=term&pressEnter=true").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::Injected { .. }, StepOutcome::EnterPressed]
    ));
    let events = session.events();
    let key_events: Vec<&SyntheticEvent> = events
        .iter()
        .filter(|(node, event)| {
            *node == 7 && matches!(event.kind, EventKind::KeyDown | EventKind::KeyUp)
        })
        .map(|(_, event)| event)
        .collect();
    assert_eq!(key_events.len(), 2);
    assert_eq!(key_events[0].kind, EventKind::KeyDown);
    assert_eq!(key_events[1].kind, EventKind::KeyUp);
    assert!(key_events.iter().all(|event| event.key_code == Some(13)));
}

#[tokio::test(start_paused = true)]
async fn press_enter_without_prior_injection_is_a_warning_only() {
    let session = MockSession::new();

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("pressEnter=true").await;

    assert!(matches!(outcomes(&summary)[..], [StepOutcome::EnterSkipped]));
    assert!(session.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn click_resets_the_press_enter_target() {
    let session = MockSession::new();
    session.add_element("q", 1, text_input());
    session.add_element("go", 2, button());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("q=term&go=click&pressEnter=true").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [
            StepOutcome::Injected { .. },
            StepOutcome::Clicked { .. },
            StepOutcome::EnterSkipped
        ]
    ));
    assert_eq!(session.state.lock().unwrap().clicks, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn failed_keyup_reports_a_partial_enter() {
    let session = MockSession::new();
    session.add_element("q", 1, text_input());
    session.reject_keyups.store(true, Ordering::SeqCst);

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("q=term&pressEnter=true").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::Injected { .. }, StepOutcome::EnterFailed]
    ));
    // The key-down was already delivered when the key-up was refused.
    let kinds: Vec<EventKind> = session.events().iter().map(|(_, e)| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Input, EventKind::Change, EventKind::KeyDown]
    );
}

#[tokio::test(start_paused = true)]
async fn detached_press_enter_target_is_skipped() {
    let session = MockSession::new();
    session.add_element("q", 1, text_input());

    let detacher = session.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        detacher.detach(1);
    });

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("q=term&wait=200ms&pressEnter=true").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [
            StepOutcome::Injected { .. },
            StepOutcome::Waited { .. },
            StepOutcome::EnterSkipped
        ]
    ));
}

#[tokio::test(start_paused = true)]
async fn missing_element_times_out_and_later_steps_still_run() {
    let session = MockSession::new();
    session.add_element("real", 1, text_input());

    let started = tokio::time::Instant::now();
    let controller = ReplayController::new(session.as_ref(), options(3_000));
    let summary = controller.run("ghost=1&real=2").await;

    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::NotFound { .. }, StepOutcome::Injected { .. }]
    ));
    assert_eq!(session.value_of(1).as_deref(), Some("2"));
}

#[tokio::test(start_paused = true)]
async fn invalid_selector_waits_out_the_deadline_without_aborting() {
    let session = MockSession::new();
    session.add_element("after", 1, text_input());

    let controller = ReplayController::new(session.as_ref(), options(1_000));
    let summary = controller.run("css%3Adiv%3Ahover=x&after=ok").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::NotFound { .. }, StepOutcome::Injected { .. }]
    ));
}

#[tokio::test(start_paused = true)]
async fn malformed_segment_is_dropped_alone() {
    let session = MockSession::new();
    session.add_element("b", 1, text_input());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("a=%zz&b=ok").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::SkippedMalformed { .. }, StepOutcome::Injected { .. }]
    ));
    assert_eq!(session.value_of(1).as_deref(), Some("ok"));
}

#[tokio::test(start_paused = true)]
async fn blank_step_clears_the_press_enter_target() {
    let session = MockSession::new();
    session.add_element("q", 1, text_input());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("q=term&&pressEnter=true").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [
            StepOutcome::Injected { .. },
            StepOutcome::SkippedBlank,
            StepOutcome::EnterSkipped
        ]
    ));
}

#[tokio::test(start_paused = true)]
async fn non_text_injection_is_not_a_press_enter_target() {
    let session = MockSession::new();
    session.add_element("box", 1, checkbox());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("box=on&pressEnter=true").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::Injected { .. }, StepOutcome::EnterSkipped]
    ));
    assert_eq!(session.value_of(1).as_deref(), Some("on"));
}

#[tokio::test(start_paused = true)]
async fn content_editable_injection_keeps_enter_eligibility() {
    let session = MockSession::new();
    session.add_element("note", 4, editable_div());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("note=remember&pressEnter=true").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::Injected { .. }, StepOutcome::EnterPressed]
    ));
    assert_eq!(
        session.state.lock().unwrap().texts.get(&4).map(String::as_str),
        Some("remember")
    );
    // Content-editable injection dispatches input only, then the two key
    // events from the press-enter step.
    let kinds: Vec<EventKind> = session.events().iter().map(|(_, e)| e.kind).collect();
    assert_eq!(
        kinds,
        vec![EventKind::Input, EventKind::KeyDown, EventKind::KeyUp]
    );
}

#[tokio::test(start_paused = true)]
async fn select_injection_by_exact_value() {
    let session = MockSession::new();
    session.add_select(
        "country",
        9,
        select_facts(),
        vec![
            SelectOption {
                value: "US".into(),
                text: "United States".into(),
                selected: true,
            },
            SelectOption {
                value: "CA".into(),
                text: "Canada".into(),
                selected: false,
            },
            SelectOption {
                value: "MX".into(),
                text: "Mexico".into(),
                selected: false,
            },
        ],
    );

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("country=CA").await;

    assert!(matches!(outcomes(&summary)[..], [StepOutcome::Injected { .. }]));
    assert_eq!(session.state.lock().unwrap().chosen, vec![(9, 1)]);
    let kinds: Vec<EventKind> = session.events().iter().map(|(_, e)| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Change, EventKind::Input]);
}

#[tokio::test(start_paused = true)]
async fn select_with_no_matching_option_fails_without_mutation() {
    let session = MockSession::new();
    session.add_select(
        "country",
        9,
        select_facts(),
        vec![SelectOption {
            value: "US".into(),
            text: "United States".into(),
            selected: true,
        }],
    );

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("country=XX").await;

    assert!(matches!(
        outcomes(&summary)[..],
        [StepOutcome::InjectFailed { .. }]
    ));
    assert!(session.state.lock().unwrap().chosen.is_empty());
    assert!(session.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn replay_runs_at_most_once_per_page_load() {
    let session = MockSession::new();
    session.add_element("q", 1, text_input());

    let first = ReplayController::new(session.as_ref(), options(15_000))
        .run("q=one")
        .await;
    let second = ReplayController::new(session.as_ref(), options(15_000))
        .run("q=two")
        .await;

    assert!(first.ran);
    assert!(!second.ran);
    assert!(second.steps.is_empty());
    assert_eq!(session.value_of(1).as_deref(), Some("one"));
}

#[tokio::test(start_paused = true)]
async fn summaries_serialize_with_flattened_outcomes() {
    let session = MockSession::new();
    session.add_element("q", 1, text_input());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("q=term&wait=100ms").await;

    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["ran"], true);
    assert_eq!(value["steps"][0]["index"], 0);
    assert_eq!(value["steps"][0]["outcome"], "injected");
    assert_eq!(value["steps"][0]["locator"], "q");
    assert_eq!(value["steps"][1]["outcome"], "waited");
    assert_eq!(value["steps"][1]["millis"], 100);
}

#[tokio::test(start_paused = true)]
async fn duplicate_keys_execute_once_each_in_order() {
    let session = MockSession::new();
    session.add_element("q", 1, text_input());

    let controller = ReplayController::new(session.as_ref(), options(15_000));
    let summary = controller.run("q=first&q=second").await;

    assert_eq!(summary.steps.len(), 2);
    // Last write wins on the page, proving both steps ran in order.
    assert_eq!(session.value_of(1).as_deref(), Some("second"));
}
