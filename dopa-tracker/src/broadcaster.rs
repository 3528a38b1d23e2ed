//! State broadcaster
//!
//! Fan-out of pipeline state to observers (SSE clients, tests). Holds no
//! state beyond the underlying event bus; publishing never blocks or fails
//! the pipeline.

use chrono::{DateTime, Utc};
use dopa_common::events::{
    DopaEvent, EventBus, FeatureSnapshot, FinanceState, SettlementDirection,
};
use tokio::sync::broadcast;

/// Default event buffer per subscriber
pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct StateBroadcaster {
    bus: EventBus,
}

impl StateBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            bus: EventBus::new(capacity),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DopaEvent> {
        self.bus.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }

    pub fn publish(&self, event: DopaEvent) {
        self.bus.emit_lossy(event);
    }

    pub fn score(&self, score: f64, features: FeatureSnapshot) {
        self.publish(DopaEvent::ScoreUpdated {
            score,
            features,
            timestamp: features.timestamp,
        });
    }

    pub fn finance(&self, finance: FinanceState, timestamp: DateTime<Utc>) {
        self.publish(DopaEvent::FinanceUpdated { finance, timestamp });
    }

    pub fn settlement_completed(
        &self,
        direction: SettlementDirection,
        amount: f64,
        receipt_id: String,
        timestamp: DateTime<Utc>,
    ) {
        self.publish(DopaEvent::SettlementCompleted {
            direction,
            amount,
            receipt_id,
            timestamp,
        });
    }

    pub fn settlement_failed(
        &self,
        direction: SettlementDirection,
        amount: f64,
        error: String,
        timestamp: DateTime<Utc>,
    ) {
        self.publish(DopaEvent::SettlementFailed {
            direction,
            amount,
            error,
            timestamp,
        });
    }
}

impl Default for StateBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
