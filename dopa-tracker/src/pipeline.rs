//! Tracking pipeline
//!
//! One periodic tick drives every stage in order:
//!
//! ```text
//! capture -> visual/audio extractors -> aggregator -> integrator -> reconciler
//!                                                         |
//!                                                    broadcaster
//! ```
//!
//! The tick never waits on the network. Ledger calls run on tasks spawned
//! by the reconciler; analyzer calls run on tasks spawned here and report
//! back over a channel that the run loop drains between ticks.

use crate::analyzer::{Analysis, SemanticAnalyzer};
use crate::broadcaster::StateBroadcaster;
use crate::capture::CaptureSource;
use crate::db::CheckpointStore;
use crate::engagement::{ScoreIntegrator, ScoreUpdate};
use crate::features::{AudioExtractor, FeatureAggregator, FrameBuffer, VisualExtractor};
use crate::settlement::{ReconcileOutcome, SettlementReconciler};
use chrono::{DateTime, Utc};
use dopa_common::events::{DopaEvent, FeatureSnapshot};
use dopa_common::time;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pending analyzer results kept before the run loop drains them
const ANALYSIS_CHANNEL_CAPACITY: usize = 8;

/// Latest score and features, readable without touching the pipeline
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiveState {
    pub score: f64,
    pub features: Option<FeatureSnapshot>,
}

pub type SharedLiveState = Arc<RwLock<LiveState>>;

/// What one tick produced
#[derive(Debug)]
pub struct TickReport {
    pub snapshot: FeatureSnapshot,
    pub update: ScoreUpdate,
    pub settlement: ReconcileOutcome,
}

/// Clears the in-flight flag however the analysis task ends
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Samples frames for the semantic analyzer, one call at a time
struct AnalyzerSampler {
    analyzer: Arc<dyn SemanticAnalyzer>,
    interval: chrono::Duration,
    last_sample: Option<DateTime<Utc>>,
    in_flight: Arc<AtomicBool>,
}

impl AnalyzerSampler {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.in_flight.load(Ordering::SeqCst) {
            return false;
        }
        match self.last_sample {
            Some(last) => now - last >= self.interval,
            None => true,
        }
    }

    fn dispatch(&mut self, frame: FrameBuffer, now: DateTime<Utc>, tx: mpsc::Sender<Analysis>) {
        self.last_sample = Some(now);
        self.in_flight.store(true, Ordering::SeqCst);

        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        let analyzer = Arc::clone(&self.analyzer);
        tokio::spawn(async move {
            let _guard = guard;
            match analyzer.analyze(&frame).await {
                Ok(analysis) => {
                    debug!(score = analysis.score, "Analyzer result received");
                    // Pipeline gone or backlog full: the spike is best-effort
                    if tx.try_send(analysis).is_err() {
                        debug!("Dropping analyzer result");
                    }
                }
                Err(e) => warn!("Frame analysis failed: {}", e),
            }
        });
    }
}

/// Per-session pipeline state
///
/// Owns the extractors, the aggregator window and the `EngagementState`.
/// Built fresh for every session so nothing leaks between sessions.
pub struct Pipeline {
    capture: Arc<dyn CaptureSource>,
    visual: VisualExtractor,
    audio: AudioExtractor,
    aggregator: FeatureAggregator,
    integrator: ScoreIntegrator,
    reconciler: Arc<SettlementReconciler>,
    store: Arc<dyn CheckpointStore>,
    broadcaster: StateBroadcaster,
    live: SharedLiveState,
    sampler: Option<AnalyzerSampler>,
    analysis_tx: mpsc::Sender<Analysis>,
    analysis_rx: mpsc::Receiver<Analysis>,
}

impl Pipeline {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        reconciler: Arc<SettlementReconciler>,
        store: Arc<dyn CheckpointStore>,
        broadcaster: StateBroadcaster,
        live: SharedLiveState,
        initial_score: f64,
    ) -> Self {
        let (analysis_tx, analysis_rx) = mpsc::channel(ANALYSIS_CHANNEL_CAPACITY);

        Self {
            capture,
            visual: VisualExtractor::new(),
            audio: AudioExtractor::new(),
            aggregator: FeatureAggregator::new(),
            integrator: ScoreIntegrator::new(initial_score),
            reconciler,
            store,
            broadcaster,
            live,
            sampler: None,
            analysis_tx,
            analysis_rx,
        }
    }

    /// Enable semantic analysis, sampling at most one frame per `interval`
    pub fn with_analyzer(mut self, analyzer: Arc<dyn SemanticAnalyzer>, interval: Duration) -> Self {
        let interval = chrono::Duration::from_std(interval)
            .unwrap_or_else(|_| chrono::Duration::seconds(1));
        self.sampler = Some(AnalyzerSampler {
            analyzer,
            interval,
            last_sample: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        });
        self
    }

    pub fn score(&self) -> f64 {
        self.integrator.score()
    }

    /// True while an analyzer call is outstanding
    pub fn analysis_in_flight(&self) -> bool {
        self.sampler
            .as_ref()
            .is_some_and(|s| s.in_flight.load(Ordering::SeqCst))
    }

    /// Run one feature tick at `now`
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let frame = self.capture.frame();
        let spectrum = self.capture.spectrum();

        if let (Some(sampler), Some(frame)) = (self.sampler.as_mut(), frame.as_ref()) {
            if frame.is_valid() && sampler.is_due(now) {
                sampler.dispatch(frame.clone(), now, self.analysis_tx.clone());
            }
        }

        let visual = self.visual.process(frame, now);
        let audio = self.audio.process(spectrum.as_ref(), now);
        let snapshot = self.aggregator.tick(&visual, &audio, now);
        let update = self.integrator.integrate(&snapshot);

        debug!(
            score = update.score,
            stimulation = update.instant_stimulation,
            dt = update.time_delta,
            idle = update.idle,
            motion = snapshot.motion,
            loudness = snapshot.loudness,
            cuts = snapshot.cuts_per_minute,
            bpm = snapshot.bpm,
            "Tick"
        );

        self.publish_score(update.score, Some(snapshot)).await;
        self.broadcaster.score(update.score, snapshot);

        let settlement = self.reconciler.reconcile(update.score).await;

        TickReport {
            snapshot,
            update,
            settlement,
        }
    }

    /// Apply an analyzer result as a one-shot spike
    ///
    /// Returns the amount added, or None if the report was ignored.
    pub async fn apply_analysis(&mut self, analysis: Analysis, now: DateTime<Utc>) -> Option<f64> {
        let spike = match self.integrator.apply_spike(analysis.score) {
            Some(spike) => spike,
            None => {
                debug!(reported = analysis.score, "Ignoring non-positive analyzer score");
                return None;
            }
        };

        let score = self.integrator.score();
        info!(
            reported = analysis.score,
            spike,
            score,
            reason = analysis.reason.as_deref().unwrap_or(""),
            "Analyzer spike applied"
        );

        self.publish_score(score, None).await;
        self.broadcaster.publish(DopaEvent::SpikeApplied {
            reported: analysis.score,
            spike,
            reason: analysis.reason,
            score,
            timestamp: now,
        });

        Some(spike)
    }

    /// Wait for the next analyzer result
    pub async fn next_analysis(&mut self) -> Option<Analysis> {
        self.analysis_rx.recv().await
    }

    async fn publish_score(&self, score: f64, features: Option<FeatureSnapshot>) {
        if let Err(e) = self.store.save_score(score).await {
            warn!("Failed to checkpoint score: {}", e);
        }

        let mut live = self.live.write().await;
        live.score = score;
        if features.is_some() {
            live.features = features;
        }
    }

    /// Tick every `tick_interval` until `cancel` fires
    ///
    /// Returns the score at the moment the loop stopped. A slow tick delays
    /// the next one instead of bursting to catch up; the integrator scales
    /// by elapsed time so nothing is lost.
    pub async fn run(mut self, tick_interval: Duration, cancel: CancellationToken) -> f64 {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(analysis) = self.analysis_rx.recv() => {
                    self.apply_analysis(analysis, time::now()).await;
                }
                _ = ticker.tick() => {
                    self.tick(time::now()).await;
                }
            }
        }

        debug!(score = self.integrator.score(), "Pipeline stopped");
        self.integrator.score()
    }
}
