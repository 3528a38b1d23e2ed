//! Checkpoint persistence
//!
//! The core persists four scalars so a restart resumes near where it left
//! off: the engagement score, the bound wallet, its allowance and the
//! cumulative settled amount. Scores are written after every integration
//! step, finance state only after a successful ledger call or an allowance
//! change.

use crate::engagement::MAX_SCORE;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dopa_common::events::FinanceState;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

use super::settings::{get_setting, set_setting};

const KEY_SCORE: &str = "engagement_score";
const KEY_WALLET: &str = "finance_wallet_id";
const KEY_ALLOWANCE: &str = "finance_total_allowance";
const KEY_SETTLED: &str = "finance_cumulative_settled";

/// Everything the core restores at startup
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Checkpoint {
    pub score: f64,
    pub finance: FinanceState,
}

impl Checkpoint {
    /// Clamp a loaded checkpoint back into its invariants
    ///
    /// A corrupted checkpoint is repaired with a warning rather than
    /// rejected.
    pub fn sanitized(mut self) -> Self {
        let score = if self.score.is_finite() {
            self.score.clamp(0.0, MAX_SCORE)
        } else {
            0.0
        };
        if score != self.score {
            warn!(
                "Checkpointed score {} outside [0, {}], clamped to {}",
                self.score, MAX_SCORE, score
            );
            self.score = score;
        }

        let before = self.finance.clone();
        if self.finance.clamp_to_invariants() {
            warn!(
                "Checkpointed finance state out of range (allowance {}, settled {}), clamped to (allowance {}, settled {})",
                before.total_allowance,
                before.cumulative_settled,
                self.finance.total_allowance,
                self.finance.cumulative_settled
            );
        }

        self
    }
}

/// Checkpoint storage backend
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last checkpoint (defaults when nothing was stored)
    async fn load(&self) -> Result<Checkpoint>;

    /// Persist the engagement score
    async fn save_score(&self, score: f64) -> Result<()>;

    /// Persist finance state
    async fn save_finance(&self, finance: &FinanceState) -> Result<()>;
}

/// Checkpoint store backed by the SQLite settings table
#[derive(Clone)]
pub struct SqliteCheckpointStore {
    db: Pool<Sqlite>,
}

impl SqliteCheckpointStore {
    pub fn new(db: Pool<Sqlite>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        let score = load_field::<f64>(&self.db, KEY_SCORE).await?.unwrap_or(0.0);
        let wallet_id = load_field::<String>(&self.db, KEY_WALLET).await?;
        let total_allowance = load_field::<f64>(&self.db, KEY_ALLOWANCE)
            .await?
            .unwrap_or(0.0);
        let cumulative_settled = load_field::<f64>(&self.db, KEY_SETTLED)
            .await?
            .unwrap_or(0.0);

        Ok(Checkpoint {
            score,
            finance: FinanceState {
                wallet_id,
                total_allowance,
                cumulative_settled,
            },
        })
    }

    async fn save_score(&self, score: f64) -> Result<()> {
        set_setting(&self.db, KEY_SCORE, score).await
    }

    async fn save_finance(&self, finance: &FinanceState) -> Result<()> {
        // Three rows change together or not at all
        let mut tx = self.db.begin().await?;

        match &finance.wallet_id {
            Some(wallet) => {
                upsert(&mut tx, KEY_WALLET, wallet.clone()).await?;
            }
            None => {
                sqlx::query("DELETE FROM settings WHERE key = ?")
                    .bind(KEY_WALLET)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        upsert(&mut tx, KEY_ALLOWANCE, finance.total_allowance.to_string()).await?;
        upsert(&mut tx, KEY_SETTLED, finance.cumulative_settled.to_string()).await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Read one checkpoint field
///
/// An unparseable value is dropped with a warning so the remaining fields
/// still restore. Database errors propagate.
async fn load_field<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    match get_setting::<T>(db, key).await {
        Ok(value) => Ok(value),
        Err(Error::Config(msg)) => {
            warn!("{}; using default for '{}'", msg, key);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

async fn upsert(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    key: &str,
    value: String,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// In-process checkpoint store
///
/// Used for `--ephemeral` runs and tests. Writes can be made to fail to
/// exercise the "persistence failure never halts the pipeline" path.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoint: Mutex<Checkpoint>,
    fail_writes: AtomicBool,
    score_writes: AtomicUsize,
    finance_writes: AtomicUsize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a checkpoint (simulates a restart)
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            checkpoint: Mutex::new(checkpoint),
            ..Self::default()
        }
    }

    /// Make subsequent writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current stored checkpoint
    pub fn snapshot(&self) -> Checkpoint {
        self.lock().clone()
    }

    pub fn score_writes(&self) -> usize {
        self.score_writes.load(Ordering::SeqCst)
    }

    pub fn finance_writes(&self) -> usize {
        self.finance_writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Checkpoint> {
        // A panic while holding this lock cannot leave a half-written
        // checkpoint, so a poisoned lock is still usable
        self.checkpoint
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(Error::Internal("checkpoint store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Checkpoint> {
        Ok(self.snapshot())
    }

    async fn save_score(&self, score: f64) -> Result<()> {
        self.check_writable()?;
        self.lock().score = score;
        self.score_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_finance(&self, finance: &FinanceState) -> Result<()> {
        self.check_writable()?;
        self.lock().finance = finance.clone();
        self.finance_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
