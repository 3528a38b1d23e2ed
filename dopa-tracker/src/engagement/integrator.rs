//! Stateful engagement score integrator
//!
//! Per snapshot:
//! 1. `time_delta` = seconds since the previous update (0 on the first one)
//! 2. Idle gate: `motion < 0.01 && loudness < 5` forces stimulation to 0, so
//!    a paused or muted source cannot keep accruing from stale cut/beat counts
//! 3. `stimulation = motion*20 + loudness*0.1 + cuts*2 + bpm*0.05`
//! 4. Above 5 the score grows by `stimulation * 0.5 * time_delta`, otherwise
//!    it decays linearly by `2.0 * time_delta`
//! 5. The result is clamped to `[0, MAX_SCORE]`
//!
//! The weights are policy constants. Changing them changes settlement
//! amounts, so they are pinned by tests.

use chrono::{DateTime, Utc};
use dopa_common::events::FeatureSnapshot;
use dopa_common::time::seconds_between;

/// Upper bound of the engagement score
pub const MAX_SCORE: f64 = 10_000.0;

/// Score gained per unit of stimulation per second
pub const GROWTH_MULTIPLIER: f64 = 0.5;

/// Score lost per second while stimulation is at or below the threshold
pub const DECAY_RATE: f64 = 2.0;

/// Stimulation must exceed this for the score to grow
pub const GROWTH_THRESHOLD: f64 = 5.0;

/// Idle gate: motion below this...
pub const IDLE_MOTION: f64 = 0.01;
/// ...and loudness below this
pub const IDLE_LOUDNESS: f64 = 5.0;

pub const MOTION_WEIGHT: f64 = 20.0;
pub const LOUDNESS_WEIGHT: f64 = 0.1;
pub const CUT_WEIGHT: f64 = 2.0;
pub const BPM_WEIGHT: f64 = 0.05;

/// Fraction of an analyzer-reported score added as a spike
pub const SPIKE_WEIGHT: f64 = 0.5;

/// Engagement state for one tracking session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngagementState {
    /// Current score (0.0-MAX_SCORE)
    pub score: f64,
    /// Timestamp of the last integrated snapshot
    pub last_update_time: Option<DateTime<Utc>>,
}

/// Result of integrating one snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreUpdate {
    pub previous_score: f64,
    pub score: f64,
    pub instant_stimulation: f64,
    /// Seconds integrated over
    pub time_delta: f64,
    /// Idle gate forced stimulation to zero
    pub idle: bool,
}

/// True when the source looks paused or muted
pub fn is_idle(features: &FeatureSnapshot) -> bool {
    features.motion < IDLE_MOTION && features.loudness < IDLE_LOUDNESS
}

/// Weighted stimulation for one snapshot, after the idle gate
pub fn instant_stimulation(features: &FeatureSnapshot) -> f64 {
    if is_idle(features) {
        return 0.0;
    }

    features.motion * MOTION_WEIGHT
        + features.loudness * LOUDNESS_WEIGHT
        + features.cuts_per_minute as f64 * CUT_WEIGHT
        + features.bpm as f64 * BPM_WEIGHT
}

/// Owns the `EngagementState` and is its only mutator
#[derive(Debug, Clone)]
pub struct ScoreIntegrator {
    state: EngagementState,
}

impl ScoreIntegrator {
    /// Start from a (possibly checkpointed) score
    pub fn new(initial_score: f64) -> Self {
        Self::from_state(EngagementState {
            score: initial_score,
            last_update_time: None,
        })
    }

    pub fn from_state(state: EngagementState) -> Self {
        Self {
            state: EngagementState {
                score: clamp_score(state.score),
                last_update_time: state.last_update_time,
            },
        }
    }

    pub fn state(&self) -> EngagementState {
        self.state
    }

    pub fn score(&self) -> f64 {
        self.state.score
    }

    /// Integrate one snapshot
    ///
    /// Snapshots must arrive in tick order. A timestamp earlier than the
    /// previous one integrates over zero seconds.
    pub fn integrate(&mut self, features: &FeatureSnapshot) -> ScoreUpdate {
        let time_delta = match self.state.last_update_time {
            Some(last) => seconds_between(last, features.timestamp).max(0.0),
            None => 0.0,
        };
        self.state.last_update_time = Some(features.timestamp);

        let idle = is_idle(features);
        let stimulation = instant_stimulation(features);

        let delta = if stimulation > GROWTH_THRESHOLD {
            stimulation * GROWTH_MULTIPLIER * time_delta
        } else {
            -DECAY_RATE * time_delta
        };

        let previous_score = self.state.score;
        self.state.score = clamp_score(previous_score + delta);

        ScoreUpdate {
            previous_score,
            score: self.state.score,
            instant_stimulation: stimulation,
            time_delta,
            idle,
        }
    }

    /// Add an analyzer spike of `reported * SPIKE_WEIGHT`
    ///
    /// Bypasses the idle gate and threshold. Non-positive or non-finite
    /// reports are ignored and return None; otherwise returns the spike
    /// actually added after clamping.
    pub fn apply_spike(&mut self, reported: f64) -> Option<f64> {
        if !reported.is_finite() || reported <= 0.0 {
            return None;
        }

        let previous = self.state.score;
        self.state.score = clamp_score(previous + reported * SPIKE_WEIGHT);
        Some(self.state.score - previous)
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, MAX_SCORE)
    } else {
        0.0
    }
}
