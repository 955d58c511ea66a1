//! Core types and pure logic for keyword-sentinel.
//!
//! Holds the domain model, the keyword matcher, notification rendering,
//! configuration, and the transport traits the runtime is written against.

pub mod error;
pub mod formatting;
pub mod matcher;
pub mod models;
pub mod ports;
pub mod settings;

pub use error::{Result, SentinelError, TransportError};
