//! Parsing of raw RFC 5322 messages into the MIME model.

pub mod header;
pub mod mime;
