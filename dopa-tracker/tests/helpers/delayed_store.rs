//! Checkpoint store that can stall score writes

use async_trait::async_trait;
use dopa_common::events::FinanceState;
use dopa_tracker::db::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
use dopa_tracker::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a `MemoryCheckpointStore`; once armed, every `save_score` sleeps
/// for `delay` before writing
pub struct DelayedStore {
    inner: Arc<MemoryCheckpointStore>,
    delay: Duration,
    armed: AtomicBool,
}

impl DelayedStore {
    pub fn new(inner: Arc<MemoryCheckpointStore>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            armed: AtomicBool::new(false),
        }
    }

    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CheckpointStore for DelayedStore {
    async fn load(&self) -> Result<Checkpoint> {
        self.inner.load().await
    }

    async fn save_score(&self, score: f64) -> Result<()> {
        if self.armed.load(Ordering::SeqCst) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.save_score(score).await
    }

    async fn save_finance(&self, finance: &FinanceState) -> Result<()> {
        self.inner.save_finance(finance).await
    }
}
