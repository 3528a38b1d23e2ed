//! Settlement reconciler
//!
//! Keeps the amount locked from the user's allowance proportional to the
//! engagement score:
//!
//! ```text
//! target_locked = total_allowance * score / MAX_SCORE
//! delta         = target_locked - cumulative_settled
//! ```
//!
//! A positive delta is slashed, a negative one refunded. At most one ledger
//! call is in flight per reconciler: the settle lock guard is moved into the
//! spawned call and released when it finishes, however it finishes. Finance
//! state advances only on a positive acknowledgment, so a failed call leaves
//! the delta in place for the next cycle to recompute.

use crate::broadcaster::StateBroadcaster;
use crate::db::CheckpointStore;
use crate::engagement::MAX_SCORE;
use crate::error::{Error, Result};
use crate::settlement::ledger::{Ledger, LedgerReceipt};
use dopa_common::events::{FinanceState, SettlementDirection};
use dopa_common::time;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Deltas smaller than this are treated as already settled
pub const DEFAULT_SYNC_THRESHOLD: f64 = 1e-6;

/// A settlement decided by one reconciliation cycle
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementIntent {
    pub wallet_id: String,
    pub direction: SettlementDirection,
    /// Positive amount to move
    pub amount: f64,
    /// Signed change applied to `cumulative_settled` on success
    pub delta: f64,
    pub target_locked: f64,
}

impl SettlementIntent {
    /// Work out what (if anything) brings `finance` to the locked target
    /// for `score`. Returns None when within `sync_threshold`.
    pub fn compute(finance: &FinanceState, score: f64, sync_threshold: f64) -> Option<Self> {
        let wallet_id = finance.wallet_id.clone()?;
        let fraction = (score / MAX_SCORE).clamp(0.0, 1.0);
        let target_locked = finance.target_locked(fraction);
        let delta = target_locked - finance.cumulative_settled;

        if !delta.is_finite() || delta.abs() < sync_threshold {
            return None;
        }

        let direction = if delta > 0.0 {
            SettlementDirection::Slash
        } else {
            SettlementDirection::Refund
        };

        Some(Self {
            wallet_id,
            direction,
            amount: delta.abs(),
            delta,
            target_locked,
        })
    }
}

/// What one reconciliation cycle did
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// No wallet bound or allowance not positive
    Unbound,
    /// A ledger call is already in flight
    Busy,
    /// Locked amount already matches the score
    InSync,
    /// A ledger call was started; the handle resolves when it finishes
    Dispatched {
        intent: SettlementIntent,
        handle: JoinHandle<Result<LedgerReceipt>>,
    },
}

impl ReconcileOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, ReconcileOutcome::Dispatched { .. })
    }
}

/// Held by a dispatched ledger call
///
/// Clears the in-flight flag, then releases the settle lock, however the
/// call ends.
struct SettlingGuard {
    in_flight: Arc<AtomicBool>,
    _lock: OwnedMutexGuard<()>,
}

impl SettlingGuard {
    fn new(in_flight: Arc<AtomicBool>, lock: OwnedMutexGuard<()>) -> Self {
        in_flight.store(true, Ordering::SeqCst);
        Self {
            in_flight,
            _lock: lock,
        }
    }
}

impl Drop for SettlingGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Owns `FinanceState` for one session and the lock guarding its ledger calls
pub struct SettlementReconciler {
    finance: RwLock<FinanceState>,
    settle_lock: Arc<Mutex<()>>,
    in_flight: Arc<AtomicBool>,
    ledger: Arc<dyn Ledger>,
    store: Arc<dyn CheckpointStore>,
    broadcaster: StateBroadcaster,
    sync_threshold: f64,
}

impl SettlementReconciler {
    /// Create a reconciler from (possibly checkpointed) finance state
    ///
    /// Out-of-range state is clamped with a warning.
    pub fn new(
        finance: FinanceState,
        ledger: Arc<dyn Ledger>,
        store: Arc<dyn CheckpointStore>,
        broadcaster: StateBroadcaster,
        sync_threshold: f64,
    ) -> Self {
        let mut finance = finance;
        if finance.clamp_to_invariants() {
            warn!(
                "Finance state out of range, clamped to allowance {} settled {}",
                finance.total_allowance, finance.cumulative_settled
            );
        }

        Self {
            finance: RwLock::new(finance),
            settle_lock: Arc::new(Mutex::new(())),
            in_flight: Arc::new(AtomicBool::new(false)),
            ledger,
            store,
            broadcaster,
            sync_threshold,
        }
    }

    /// Current finance state
    pub async fn finance(&self) -> FinanceState {
        self.finance.read().await.clone()
    }

    /// True while a ledger call is in flight
    pub fn is_settling(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run one reconciliation cycle against `score`
    ///
    /// Never waits for the ledger: the call, if any, runs on its own task.
    pub async fn reconcile(self: &Arc<Self>, score: f64) -> ReconcileOutcome {
        if !self.finance.read().await.is_active() {
            return ReconcileOutcome::Unbound;
        }

        let guard = match Arc::clone(&self.settle_lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Settlement in flight, skipping reconciliation");
                return ReconcileOutcome::Busy;
            }
        };

        // Re-read under the lock: the allowance may have changed meanwhile
        let finance = self.finance.read().await.clone();
        if !finance.is_active() {
            return ReconcileOutcome::Unbound;
        }

        let intent = match SettlementIntent::compute(&finance, score, self.sync_threshold) {
            Some(intent) => intent,
            None => return ReconcileOutcome::InSync,
        };

        debug!(
            direction = %intent.direction,
            amount = intent.amount,
            target = intent.target_locked,
            settled = finance.cumulative_settled,
            "Dispatching settlement"
        );

        let guard = SettlingGuard::new(Arc::clone(&self.in_flight), guard);
        let this = Arc::clone(self);
        let task_intent = intent.clone();
        let handle = tokio::spawn(async move { this.execute(task_intent, guard).await });

        ReconcileOutcome::Dispatched { intent, handle }
    }

    async fn execute(
        &self,
        intent: SettlementIntent,
        _guard: SettlingGuard,
    ) -> Result<LedgerReceipt> {
        let result = self
            .ledger
            .settle(intent.direction, &intent.wallet_id, intent.amount)
            .await;

        match &result {
            Ok(receipt) => self.apply(&intent, receipt).await,
            Err(e) => {
                warn!(
                    direction = %intent.direction,
                    amount = intent.amount,
                    "Settlement failed: {}",
                    e
                );
                self.broadcaster.settlement_failed(
                    intent.direction,
                    intent.amount,
                    e.to_string(),
                    time::now(),
                );
            }
        }

        result
    }

    async fn apply(&self, intent: &SettlementIntent, receipt: &LedgerReceipt) {
        let finance = {
            let mut finance = self.finance.write().await;
            finance.cumulative_settled += intent.delta;
            // Float residue must not push the total outside its bounds
            finance.clamp_to_invariants();
            finance.clone()
        };

        info!(
            direction = %intent.direction,
            amount = intent.amount,
            receipt = %receipt.receipt_id,
            settled = finance.cumulative_settled,
            "Settlement confirmed"
        );

        if let Err(e) = self.store.save_finance(&finance).await {
            warn!("Failed to checkpoint finance state: {}", e);
        }

        let now = time::now();
        self.broadcaster.settlement_completed(
            intent.direction,
            intent.amount,
            receipt.receipt_id.clone(),
            now,
        );
        self.broadcaster.finance(finance, now);
    }

    /// Bind a wallet with a fresh allowance
    ///
    /// Waits for any in-flight call to finish first, so its acknowledgment
    /// is applied to the old allowance and never to the new one.
    pub async fn set_allowance(&self, wallet_id: &str, amount: f64) -> Result<FinanceState> {
        let wallet_id = wallet_id.trim();
        if wallet_id.is_empty() {
            return Err(Error::BadRequest("wallet_id must not be empty".to_string()));
        }
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::BadRequest(format!(
                "allowance must be a positive number, got {}",
                amount
            )));
        }

        let _guard = self.settle_lock.lock().await;
        let finance = FinanceState::bound(wallet_id, amount);
        *self.finance.write().await = finance.clone();

        info!(wallet = %wallet_id, allowance = amount, "Allowance bound");
        self.commit(&finance).await;
        Ok(finance)
    }

    /// Unbind the wallet and zero the allowance
    pub async fn revoke_allowance(&self) -> FinanceState {
        let _guard = self.settle_lock.lock().await;
        let finance = FinanceState::default();
        *self.finance.write().await = finance.clone();

        info!("Allowance revoked");
        self.commit(&finance).await;
        finance
    }

    /// Wait until no ledger call is in flight
    pub async fn wait_idle(&self) {
        let _guard = self.settle_lock.lock().await;
    }

    async fn commit(&self, finance: &FinanceState) {
        if let Err(e) = self.store.save_finance(finance).await {
            warn!("Failed to checkpoint finance state: {}", e);
        }
        self.broadcaster.finance(finance.clone(), time::now());
    }
}
