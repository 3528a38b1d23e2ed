//! Session control
//!
//! `Tracker` is the surface the HTTP layer talks to. It owns the state that
//! outlives a session (finance, last score, capture slots) and spawns a
//! fresh [`Pipeline`] for each tracking session.

use crate::analyzer::SemanticAnalyzer;
use crate::broadcaster::StateBroadcaster;
use crate::capture::{CaptureSource, PushCaptureSource};
use crate::config::RuntimeSettings;
use crate::db::{Checkpoint, CheckpointStore};
use crate::error::{Error, Result};
use crate::pipeline::{LiveState, Pipeline, SharedLiveState};
use crate::settlement::{Ledger, SettlementReconciler};
use chrono::{DateTime, Utc};
use dopa_common::events::{DopaEvent, FeatureSnapshot, FinanceState};
use dopa_common::time;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Snapshot of everything an observer may want to render
#[derive(Debug, Clone, Serialize)]
pub struct TrackerState {
    pub score: f64,
    pub features: Option<FeatureSnapshot>,
    pub finance: FinanceState,
    pub session: Option<SessionInfo>,
    /// A ledger call is in flight
    pub settling: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionInfo {
    pub id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
}

struct ActiveSession {
    info: SessionInfo,
    cancel: CancellationToken,
    handle: JoinHandle<f64>,
}

pub struct Tracker {
    capture: Arc<PushCaptureSource>,
    reconciler: Arc<SettlementReconciler>,
    store: Arc<dyn CheckpointStore>,
    broadcaster: StateBroadcaster,
    analyzer: Option<Arc<dyn SemanticAnalyzer>>,
    settings: RuntimeSettings,
    live: SharedLiveState,
    session: Mutex<Option<ActiveSession>>,
}

impl Tracker {
    /// Restore from the checkpoint store and build an idle tracker
    ///
    /// Corrupt checkpoint values are clamped (with a warning); an unreadable
    /// store falls back to a fresh state rather than refusing to start.
    pub async fn restore(
        store: Arc<dyn CheckpointStore>,
        ledger: Arc<dyn Ledger>,
        analyzer: Option<Arc<dyn SemanticAnalyzer>>,
        broadcaster: StateBroadcaster,
        settings: RuntimeSettings,
    ) -> Self {
        let checkpoint = match store.load().await {
            Ok(checkpoint) => checkpoint.sanitized(),
            Err(e) => {
                warn!("Failed to load checkpoint, starting fresh: {}", e);
                Checkpoint::default()
            }
        };

        info!(
            score = checkpoint.score,
            wallet = checkpoint.finance.wallet_id.as_deref().unwrap_or("-"),
            allowance = checkpoint.finance.total_allowance,
            settled = checkpoint.finance.cumulative_settled,
            "Restored checkpoint"
        );

        let reconciler = Arc::new(SettlementReconciler::new(
            checkpoint.finance,
            ledger,
            Arc::clone(&store),
            broadcaster.clone(),
            settings.sync_threshold,
        ));

        Self {
            capture: Arc::new(PushCaptureSource::new()),
            reconciler,
            store,
            broadcaster,
            analyzer,
            settings,
            live: Arc::new(RwLock::new(LiveState {
                score: checkpoint.score,
                features: None,
            })),
            session: Mutex::new(None),
        }
    }

    /// Push-side of the capture source
    pub fn capture(&self) -> &Arc<PushCaptureSource> {
        &self.capture
    }

    pub fn broadcaster(&self) -> &StateBroadcaster {
        &self.broadcaster
    }

    pub fn reconciler(&self) -> &Arc<SettlementReconciler> {
        &self.reconciler
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Begin tracking `source`
    pub async fn start_session(&self, source: &str) -> Result<SessionInfo> {
        let source = source.trim();
        if source.is_empty() {
            return Err(Error::BadRequest("source must not be empty".to_string()));
        }

        let mut session = self.session.lock().await;
        if let Some(active) = session.as_ref() {
            return Err(Error::InvalidState(format!(
                "session already active for '{}'",
                active.info.source
            )));
        }

        // Frames pushed before the session belong to nobody
        self.capture.clear();

        let initial_score = self.live.read().await.score;
        let mut pipeline = Pipeline::new(
            Arc::clone(&self.capture) as Arc<dyn CaptureSource>,
            Arc::clone(&self.reconciler),
            Arc::clone(&self.store),
            self.broadcaster.clone(),
            Arc::clone(&self.live),
            initial_score,
        );
        if let Some(analyzer) = &self.analyzer {
            pipeline = pipeline.with_analyzer(Arc::clone(analyzer), self.settings.analyzer_interval());
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(pipeline.run(self.settings.tick_interval(), cancel.clone()));

        let info = SessionInfo {
            id: Uuid::new_v4(),
            source: source.to_string(),
            started_at: time::now(),
        };
        info!(session = %info.id, source = %info.source, score = initial_score, "Tracking session started");
        self.broadcaster.publish(DopaEvent::SessionStarted {
            source: info.source.clone(),
            timestamp: info.started_at,
        });

        *session = Some(ActiveSession {
            info: info.clone(),
            cancel,
            handle,
        });
        Ok(info)
    }

    /// End the active session
    ///
    /// Stops the tick loop and drops capture buffers. An in-flight ledger
    /// call is left to finish on its own. The score is reset to zero and a
    /// final reconciliation starts releasing locked funds.
    ///
    /// The session slot stays locked until the old pipeline has exited and
    /// the reset is checkpointed, so a concurrent `start_session` waits
    /// rather than running alongside it.
    pub async fn stop_session(&self) -> Result<f64> {
        let mut session = self.session.lock().await;
        let active = session
            .take()
            .ok_or_else(|| Error::InvalidState("no active session".to_string()))?;

        active.cancel.cancel();
        let final_score = match active.handle.await {
            Ok(score) => score,
            Err(e) => {
                error!("Pipeline task failed: {}", e);
                self.live.read().await.score
            }
        };

        self.capture.clear();
        {
            let mut live = self.live.write().await;
            *live = LiveState::default();
        }
        if let Err(e) = self.store.save_score(0.0).await {
            warn!("Failed to checkpoint score: {}", e);
        }

        info!(session = %active.info.id, source = %active.info.source, final_score, "Tracking session stopped");
        self.broadcaster.publish(DopaEvent::SessionStopped {
            source: active.info.source,
            final_score,
            timestamp: time::now(),
        });

        // Busy or unbound is fine: the next session picks the delta up
        self.reconciler.reconcile(0.0).await;
        drop(session);

        Ok(final_score)
    }

    pub async fn is_active(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Bind a wallet and allowance; resets cumulative settled to zero
    pub async fn set_allowance(&self, wallet_id: &str, amount: f64) -> Result<FinanceState> {
        self.reconciler.set_allowance(wallet_id, amount).await
    }

    pub async fn revoke_allowance(&self) -> FinanceState {
        self.reconciler.revoke_allowance().await
    }

    pub async fn get_state(&self) -> TrackerState {
        let live = self.live.read().await.clone();
        let session = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|active| active.info.clone());

        TrackerState {
            score: live.score,
            features: live.features,
            finance: self.reconciler.finance().await,
            session,
            settling: self.reconciler.is_settling(),
        }
    }

    /// Stop any active session (used on process shutdown)
    pub async fn shutdown(&self) {
        if self.is_active().await {
            if let Err(e) = self.stop_session().await {
                warn!("Failed to stop session during shutdown: {}", e);
            }
        }
        self.reconciler.wait_idle().await;
    }
}
