//! Core orchestration
//!
//! The session controller mediates between the message store and the AI
//! responder; the store module owns persistence.

mod session;
mod store;

pub use session::{SessionController, SessionError, SessionRegistry, SessionSnapshot};
pub use store::{MessageStore, NewMessage, SqliteStore, StoreError};
