//! `mboxsave`: save messages from a mail store into a single mbox archive.
//!
//! Messages are fetched from a [`store::MessageStore`], their text parts are
//! re-encoded as 8-bit so the archive stays human-readable, and each one is
//! appended to the destination as an mbox record. [`export::save_sync`] does
//! the work on the calling thread; [`export::save_async`] runs it on a tokio
//! blocking worker.

pub mod config;
pub mod error;
pub mod export;
pub mod i18n;
pub mod model;
pub mod parser;
pub mod store;
