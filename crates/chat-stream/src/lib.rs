pub mod assembler;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod steps;
pub mod transport;

pub use errors::{ChatError, ChatResult};
pub use session::{ChatSession, ChatStatus, SessionConfig, SessionSnapshot, SubmitOptions};
