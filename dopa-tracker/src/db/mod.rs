//! Database access layer
//!
//! Settings key/value access and the checkpoint store built on it.

pub mod checkpoint;
pub mod settings;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
