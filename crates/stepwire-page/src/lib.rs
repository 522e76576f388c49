pub mod document;
pub mod html;
mod node;
pub mod session;

pub use document::PageDocument;
pub use html::{append_fragment, parse_document};
pub use session::{Activity, SimSession};
