//! Runtime layer for Keyword Sentinel.
//!
//! Wires the store, chat transport and notifier into the live monitor and
//! the backfill processor, and schedules backfills as concurrent tasks.

pub mod backfill;
pub mod context;
pub mod dispatcher;
pub mod enrich;
pub mod live_monitor;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use sentinel_core as core;
pub use sentinel_data as data;
