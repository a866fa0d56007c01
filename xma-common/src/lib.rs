//! # XMA Common Library
//!
//! Shared code for the XMA site services including:
//! - Error types
//! - Layered configuration loading
//! - Analytics event types and the EventBus
//! - Key/value storage abstraction
//! - Time helpers

pub mod config;
pub mod error;
pub mod events;
pub mod storage;
pub mod time;

pub use error::{Error, Result};
pub use storage::{KeyValueStore, MemoryStore};
