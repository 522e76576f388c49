pub mod actions;
pub mod config;
pub mod link;
pub mod replay;
pub mod session;
pub mod waiter;

pub use replay::{ReplayController, ReplayOptions, ReplaySummary, StepOutcome, StepReport};
pub use session::{
    ElementFacts, EventKind, InjectionKind, PageSession, SelectOption, SessionError,
    SyntheticEvent, ENTER_KEY_CODE,
};
pub use waiter::{resolve_locator, wait_until};
