//! # Dopa Tracker (dopa-tracker)
//!
//! Measures how stimulating the media a user is watching is and keeps a
//! proportional share of the user's pre-authorised allowance locked with
//! an external ledger.
//!
//! **Pipeline:** capture -> feature extraction -> 60 s aggregation ->
//! engagement score integration -> settlement reconciliation, with every
//! stage's output fanned out to observers over SSE.

pub mod analyzer;
pub mod api;
pub mod broadcaster;
pub mod capture;
pub mod config;
pub mod db;
pub mod engagement;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod settlement;
pub mod tracker;

pub use error::{Error, Result};
pub use tracker::{Tracker, TrackerState};
