//! Test helper modules for dopa-tracker integration tests
//!
//! - ScriptedLedger: counts calls, fails on demand, holds calls in flight
//! - StaticCapture: capture source returning the same data every tick
//! - DelayedStore: checkpoint store whose score writes can be stalled
//! - Tracker/pipeline builders wired to in-memory stores

#![allow(dead_code)]

pub mod delayed_store;
pub mod scripted_ledger;
pub mod static_capture;
pub mod test_tracker;

pub use delayed_store::DelayedStore;
pub use scripted_ledger::{LedgerCall, ScriptedLedger};
pub use static_capture::StaticCapture;
pub use test_tracker::{at, build_pipeline, build_tracker, fast_settings, wait_for};
