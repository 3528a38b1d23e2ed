//! Event types for the dopa event system
//!
//! Provides shared event definitions and the EventBus used by the state
//! broadcaster to fan pipeline state out to observers.

mod shared_types;

pub use shared_types::{FeatureSnapshot, FinanceState, SettlementDirection};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Dopa event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission. Observers must treat every event as advisory: the pipeline
/// never waits for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DopaEvent {
    /// Engagement score integrated for a tick
    ///
    /// Triggers:
    /// - SSE: Update score gauge and live feature readout
    ScoreUpdated {
        /// Score after integration (0.0-MAX_SCORE)
        score: f64,
        /// Features the score was integrated from
        features: FeatureSnapshot,
        /// When the tick was processed
        timestamp: DateTime<Utc>,
    },

    /// Finance state changed (allowance bound/revoked or settlement applied)
    FinanceUpdated {
        /// Finance state after the change
        finance: FinanceState,
        /// When the change happened
        timestamp: DateTime<Utc>,
    },

    /// Ledger acknowledged a settlement
    SettlementCompleted {
        /// Slash or refund
        direction: SettlementDirection,
        /// Amount moved
        amount: f64,
        /// Ledger receipt (transaction signature)
        receipt_id: String,
        /// When the acknowledgment arrived
        timestamp: DateTime<Utc>,
    },

    /// Ledger call failed; the unresolved delta will be retried next cycle
    ///
    /// Triggers:
    /// - SSE: Show a non-fatal settlement warning
    SettlementFailed {
        /// Slash or refund
        direction: SettlementDirection,
        /// Amount that was attempted
        amount: f64,
        /// Failure description
        error: String,
        /// When the failure was observed
        timestamp: DateTime<Utc>,
    },

    /// Semantic analyzer spike was added to the score
    SpikeApplied {
        /// Score reported by the analyzer
        reported: f64,
        /// Amount actually added to the engagement score
        spike: f64,
        /// Analyzer's explanation, if any
        reason: Option<String>,
        /// Score after the spike
        score: f64,
        /// When the spike was applied
        timestamp: DateTime<Utc>,
    },

    /// Tracking session started
    SessionStarted {
        /// Capture source handle the session tracks
        source: String,
        /// When the session started
        timestamp: DateTime<Utc>,
    },

    /// Tracking session stopped
    SessionStopped {
        /// Capture source handle the session tracked
        source: String,
        /// Score at the moment the session ended
        final_score: f64,
        /// When the session stopped
        timestamp: DateTime<Utc>,
    },
}

impl DopaEvent {
    /// Event type name, used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            DopaEvent::ScoreUpdated { .. } => "ScoreUpdated",
            DopaEvent::FinanceUpdated { .. } => "FinanceUpdated",
            DopaEvent::SettlementCompleted { .. } => "SettlementCompleted",
            DopaEvent::SettlementFailed { .. } => "SettlementFailed",
            DopaEvent::SpikeApplied { .. } => "SpikeApplied",
            DopaEvent::SessionStarted { .. } => "SessionStarted",
            DopaEvent::SessionStopped { .. } => "SessionStopped",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Capacity Recommendations
///
/// - Desktop: 1000
/// - Testing: 10-100
///
/// # Examples
///
/// ```
/// use dopa_common::events::{DopaEvent, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(DopaEvent::SessionStarted {
///     source: "tab-1".to_string(),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(matches!(rx.try_recv(), Ok(DopaEvent::SessionStarted { .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DopaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers lag
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<DopaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: DopaEvent,
    ) -> Result<usize, broadcast::error::SendError<DopaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: DopaEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
