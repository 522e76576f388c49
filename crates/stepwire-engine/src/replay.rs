//! Sequential replay. One controller is built per page load; running it
//! consumes it, and the first thing `run` does is claim the page's replay
//! guard, so a double-injected engine replays at most once. No step
//! failure stops the loop.

use std::time::Duration;

use serde::Serialize;
use stepwire_core::query::{decode_segment, split_segments};
use stepwire_core::{Action, NodeId, Step};
use tracing::{debug, info, warn};

use crate::actions::{click, inject, press_enter, EnterOutcome, InjectOutcome};
use crate::session::PageSession;
use crate::waiter::resolve_locator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOptions {
    /// How long one target step waits for its element.
    pub resolve_timeout: Duration,
    /// Pause between the Enter key-down and key-up.
    pub keyup_delay: Duration,
}

impl Default for ReplayOptions {
    fn default() -> ReplayOptions {
        ReplayOptions {
            resolve_timeout: Duration::from_millis(15_000),
            keyup_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    SkippedMalformed { error: String },
    SkippedBlank,
    Waited { millis: u64 },
    WaitIgnored { raw: String },
    EnterPressed,
    EnterSkipped,
    /// The key-down was delivered but the key-up was not.
    EnterFailed,
    NotFound { locator: String },
    Clicked { locator: String },
    ClickFailed { locator: String },
    Injected { locator: String },
    InjectFailed { locator: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// False when the page's replay guard was already claimed.
    pub ran: bool,
    pub steps: Vec<StepReport>,
}

pub struct ReplayController<'a> {
    session: &'a dyn PageSession,
    options: ReplayOptions,
}

impl<'a> ReplayController<'a> {
    pub fn new(session: &'a dyn PageSession, options: ReplayOptions) -> ReplayController<'a> {
        ReplayController { session, options }
    }

    /// Replays every step in the query string, in decoded order. Consumes
    /// the controller; a second replay needs a new page load.
    pub async fn run(self, query: &str) -> ReplaySummary {
        if !self.session.try_begin_replay() {
            info!("replay already ran for this page load, skipping");
            return ReplaySummary {
                ran: false,
                steps: Vec::new(),
            };
        }
        debug!(query, "starting replay");

        let mut steps = Vec::new();
        let mut last_injected: Option<NodeId> = None;
        for (index, segment) in split_segments(query).enumerate() {
            let outcome = self.run_segment(segment, &mut last_injected).await;
            debug!(index, ?outcome, "step finished");
            steps.push(StepReport { index, outcome });
        }
        info!(steps = steps.len(), "replay finished");
        ReplaySummary { ran: true, steps }
    }

    async fn run_segment(
        &self,
        segment: &str,
        last_injected: &mut Option<NodeId>,
    ) -> StepOutcome {
        let (key, value) = match decode_segment(segment) {
            Ok(pair) => pair,
            Err(error) => {
                warn!(segment, %error, "dropping malformed query segment");
                *last_injected = None;
                return StepOutcome::SkippedMalformed {
                    error: error.to_string(),
                };
            }
        };
        match Step::classify(&key, &value) {
            Step::Blank => {
                debug!("empty step key, skipping");
                *last_injected = None;
                StepOutcome::SkippedBlank
            }
            Step::Wait {
                delay: Some(delay), ..
            } => {
                *last_injected = None;
                tokio::time::sleep(delay).await;
                StepOutcome::Waited {
                    millis: delay.as_millis() as u64,
                }
            }
            Step::Wait { delay: None, raw } => {
                warn!(payload = %raw, "unparseable wait duration, continuing without delay");
                *last_injected = None;
                StepOutcome::WaitIgnored { raw }
            }
            Step::PressEnter => {
                let target = last_injected.take();
                match press_enter(self.session, target, self.options.keyup_delay).await {
                    EnterOutcome::Pressed => StepOutcome::EnterPressed,
                    EnterOutcome::Skipped => StepOutcome::EnterSkipped,
                    EnterOutcome::Failed => StepOutcome::EnterFailed,
                }
            }
            Step::Target { locator, action } => {
                let node =
                    match resolve_locator(self.session, &locator, self.options.resolve_timeout)
                        .await
                    {
                        Some(node) => node,
                        None => {
                            warn!(%locator, "element did not appear before the deadline, skipping");
                            *last_injected = None;
                            return StepOutcome::NotFound {
                                locator: locator.encode(),
                            };
                        }
                    };
                match action {
                    Action::Click => {
                        *last_injected = None;
                        if click(self.session, node).await {
                            StepOutcome::Clicked {
                                locator: locator.encode(),
                            }
                        } else {
                            StepOutcome::ClickFailed {
                                locator: locator.encode(),
                            }
                        }
                    }
                    Action::Inject(text) => match inject(self.session, node, &text).await {
                        InjectOutcome::Injected { text_like } => {
                            *last_injected = if text_like { Some(node) } else { None };
                            StepOutcome::Injected {
                                locator: locator.encode(),
                            }
                        }
                        InjectOutcome::Failed => {
                            *last_injected = None;
                            StepOutcome::InjectFailed {
                                locator: locator.encode(),
                            }
                        }
                    },
                }
            }
        }
    }
}
