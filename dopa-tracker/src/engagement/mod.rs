//! Engagement score integration
//!
//! Consumes feature snapshots in tick order and integrates a bounded
//! engagement score with asymmetric growth/decay.

pub mod integrator;

pub use integrator::{
    instant_stimulation, is_idle, EngagementState, ScoreIntegrator, ScoreUpdate, MAX_SCORE,
};
