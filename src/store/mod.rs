//! Message stores: where the messages to be saved come from.
//!
//! The save pipeline only sees the [`MessageStore`] trait. Two stores ship
//! with the crate: [`MaildirStore`] for Maildir folders and directories of
//! `.eml` files, and [`MemoryStore`] for messages already held in memory.

mod maildir;
mod memory;

pub use maildir::MaildirStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::model::mime::Message;
use crate::parser::mime;

/// A read-only collection of messages addressable by a stable identifier.
///
/// Implementations must be shareable across threads: asynchronous saves read
/// from the store on a worker thread.
pub trait MessageStore: Send + Sync {
    /// Fetch and parse the message stored under `uid`.
    fn get_message(&self, uid: &str) -> Result<Message, StoreError>;

    /// All identifiers, in the store's natural order.
    fn uids(&self) -> Vec<String>;

    /// Decoded subject of a message, used for filename suggestions.
    fn subject(&self, uid: &str) -> Option<String> {
        self.get_message(uid).ok()?.subject()
    }
}

/// Parse stored bytes, rejecting empty messages.
fn parse_stored(uid: &str, data: &[u8]) -> Result<Message, StoreError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Err(StoreError::Parse {
            uid: uid.to_string(),
            reason: "message is empty".to_string(),
        });
    }
    Ok(mime::parse_message(data))
}
