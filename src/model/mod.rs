//! In-memory representation of a MIME message.

pub mod encoding;
pub mod mime;
