//! Shared type definitions for event data
//!
//! Structs that travel with events and are owned by more than one stage of
//! the tracking pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One tick's worth of derived stimulation features
///
/// Immutable once emitted by the feature aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    /// Mean colour saturation of the sampled pixels (0.0-1.0)
    pub saturation: f64,
    /// Normalised frame-to-frame difference (0.0-1.0)
    pub motion: f64,
    /// Mean spectrum magnitude (0.0-255.0)
    pub loudness: f64,
    /// Scene cuts registered in the trailing 60 s window
    pub cuts_per_minute: u32,
    /// Beat events registered in the trailing 60 s window
    ///
    /// An event count, not a tempo estimate.
    pub bpm: u32,
    /// Tick time this snapshot was produced for
    pub timestamp: DateTime<Utc>,
}

impl FeatureSnapshot {
    /// All-zero snapshot for the given tick
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            saturation: 0.0,
            motion: 0.0,
            loudness: 0.0,
            cuts_per_minute: 0,
            bpm: 0,
            timestamp,
        }
    }
}

/// Direction of a fund movement against the user's allowance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementDirection {
    /// User -> treasury
    Slash,
    /// Treasury -> user
    Refund,
}

impl std::fmt::Display for SettlementDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettlementDirection::Slash => write!(f, "slash"),
            SettlementDirection::Refund => write!(f, "refund"),
        }
    }
}

/// Financial state for one wallet
///
/// `cumulative_settled` is the net amount already moved from the user to the
/// treasury. At rest it stays within `[0, total_allowance]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FinanceState {
    /// Bound wallet (None until an allowance is set)
    pub wallet_id: Option<String>,
    /// Pre-authorised allowance in token units
    pub total_allowance: f64,
    /// Net amount moved user -> treasury so far
    pub cumulative_settled: f64,
}

impl FinanceState {
    /// Fresh state for a newly bound allowance
    pub fn bound(wallet_id: impl Into<String>, total_allowance: f64) -> Self {
        Self {
            wallet_id: Some(wallet_id.into()),
            total_allowance,
            cumulative_settled: 0.0,
        }
    }

    /// True when a wallet is bound and the allowance is positive
    pub fn is_active(&self) -> bool {
        self.wallet_id.is_some() && self.total_allowance > 0.0
    }

    /// Amount that would be locked at `fraction` (0.0-1.0) of the allowance
    pub fn target_locked(&self, fraction: f64) -> f64 {
        self.total_allowance * fraction
    }

    /// Force the invariants back into place
    ///
    /// Non-finite or negative allowance becomes 0; `cumulative_settled` is
    /// clamped into `[0, total_allowance]`. Returns true if anything changed.
    pub fn clamp_to_invariants(&mut self) -> bool {
        let mut changed = false;

        if !self.total_allowance.is_finite() || self.total_allowance < 0.0 {
            self.total_allowance = 0.0;
            changed = true;
        }

        let settled = if self.cumulative_settled.is_finite() {
            self.cumulative_settled.clamp(0.0, self.total_allowance)
        } else {
            0.0
        };
        if settled != self.cumulative_settled {
            self.cumulative_settled = settled;
            changed = true;
        }

        changed
    }
}
