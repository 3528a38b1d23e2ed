//! # Dopa Common Library
//!
//! Shared code for the dopa tracking services including:
//! - Error types
//! - Event types (DopaEvent enum) and the EventBus
//! - Data types that cross the broadcaster boundary
//! - Bootstrap configuration loading
//! - Database initialization
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
