//! Saving messages to an mbox archive: normalization, the line filter,
//! the synchronous writer, its async adapter, and filename suggestions.

pub mod filter;
pub mod mbox;
pub mod normalize;
pub mod suggest;
pub mod task;

pub use mbox::save_sync;
pub use task::{save_async, Priority};

/// Progress of a running save, delivered on the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveProgress {
    /// Sent once before the first message, with the number to save.
    Started { total: usize },
    /// Percentage complete, 1 to 100. Only sent when the value changes.
    Percent(u8),
}

/// Summary of a completed save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    /// Records written.
    pub messages: usize,
    /// Total bytes written to the archive.
    pub bytes_written: u64,
}
