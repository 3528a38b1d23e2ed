//! Builders for trackers and pipelines backed by in-memory state

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dopa_common::events::FinanceState;
use dopa_tracker::broadcaster::StateBroadcaster;
use dopa_tracker::capture::CaptureSource;
use dopa_tracker::config::RuntimeSettings;
use dopa_tracker::db::{CheckpointStore, MemoryCheckpointStore};
use dopa_tracker::pipeline::{Pipeline, SharedLiveState};
use dopa_tracker::settlement::{Ledger, SettlementReconciler, DEFAULT_SYNC_THRESHOLD};
use dopa_tracker::Tracker;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fixed instant `ms` milliseconds after a fixed epoch
pub fn at(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + ChronoDuration::milliseconds(ms)
}

/// Runtime settings with a short tick for real-time tests
pub fn fast_settings() -> RuntimeSettings {
    RuntimeSettings {
        tick_interval_ms: 50,
        ..RuntimeSettings::default()
    }
}

pub async fn build_tracker(
    ledger: Arc<dyn Ledger>,
    store: Arc<MemoryCheckpointStore>,
    settings: RuntimeSettings,
) -> Arc<Tracker> {
    Arc::new(
        Tracker::restore(
            store as Arc<dyn CheckpointStore>,
            ledger,
            None,
            StateBroadcaster::new(4096),
            settings,
        )
        .await,
    )
}

/// Pipeline plus the reconciler it drives
pub fn build_pipeline(
    capture: Arc<dyn CaptureSource>,
    ledger: Arc<dyn Ledger>,
    finance: FinanceState,
    initial_score: f64,
) -> (Pipeline, Arc<SettlementReconciler>, Arc<MemoryCheckpointStore>) {
    let store = Arc::new(MemoryCheckpointStore::new());
    let broadcaster = StateBroadcaster::new(256);
    let reconciler = Arc::new(SettlementReconciler::new(
        finance,
        ledger,
        store.clone(),
        broadcaster.clone(),
        DEFAULT_SYNC_THRESHOLD,
    ));
    let pipeline = Pipeline::new(
        capture,
        Arc::clone(&reconciler),
        store.clone(),
        broadcaster,
        SharedLiveState::default(),
        initial_score,
    );
    (pipeline, reconciler, store)
}

/// Poll `condition` every 10 ms until it holds or `timeout` passes
pub async fn wait_for<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
