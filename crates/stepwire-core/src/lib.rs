pub mod idfilter;
pub mod locator;
pub mod query;
pub mod selector;
pub mod step;
pub mod synthesize;
pub mod view;

pub use locator::{Locator, CLICK_MARKER, CSS_PREFIX, PRESS_ENTER_KEY, WAIT_KEY};
pub use query::{decode_query, decode_segment, encode_pairs, split_segments, DecodeError};
pub use step::{Action, Step};
pub use synthesize::{synthesize, IdentifyError, Synthesized};
pub use view::{DocumentView, NodeId};
