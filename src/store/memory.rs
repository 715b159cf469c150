//! In-memory store of raw messages.

use super::{parse_stored, MessageStore};
use crate::error::StoreError;
use crate::model::mime::Message;

/// Raw RFC 5322 messages keyed by identifier, kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    messages: Vec<(String, Vec<u8>)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message, replacing any existing one with the same identifier.
    pub fn insert(&mut self, uid: impl Into<String>, raw: impl Into<Vec<u8>>) {
        let uid = uid.into();
        let raw = raw.into();
        match self.messages.iter_mut().find(|(k, _)| *k == uid) {
            Some(slot) => slot.1 = raw,
            None => self.messages.push((uid, raw)),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl MessageStore for MemoryStore {
    fn get_message(&self, uid: &str) -> Result<Message, StoreError> {
        let (_, raw) = self
            .messages
            .iter()
            .find(|(k, _)| k == uid)
            .ok_or_else(|| StoreError::NotFound(uid.to_string()))?;
        parse_stored(uid, raw)
    }

    fn uids(&self) -> Vec<String> {
        self.messages.iter().map(|(k, _)| k.clone()).collect()
    }
}
