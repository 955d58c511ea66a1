//! Storage and I/O adapters for keyword-sentinel.
//!
//! Persists the source registry, reads exported chat archives as a chat
//! transport, and writes notifications to an outbox file.

pub mod archive;
pub mod outbox;
pub mod persistence;
pub mod store;

pub use sentinel_core as core;
