//! The wizard core: per-user sessions walking the question catalog.

pub mod engine;
pub mod record;
pub mod session;

pub use engine::{Engine, Reply};
pub use record::{AnswerRecord, NO_FEEDBACK_SENTINEL};
pub use session::{CallbackToken, Session, SessionStore, Submitter};
