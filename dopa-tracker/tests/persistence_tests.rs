//! Checkpoints survive a restart against an on-disk database

mod helpers;

use dopa_common::db::init_database;
use dopa_tracker::broadcaster::StateBroadcaster;
use dopa_tracker::config::RuntimeSettings;
use dopa_tracker::db::{CheckpointStore, SqliteCheckpointStore};
use dopa_tracker::Tracker;
use helpers::ScriptedLedger;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

async fn open_tracker(db_path: &Path) -> (Tracker, sqlx::SqlitePool) {
    let pool = init_database(db_path).await.unwrap();
    let settings = RuntimeSettings::load(&pool).await.unwrap();
    let tracker = Tracker::restore(
        Arc::new(SqliteCheckpointStore::new(pool.clone())),
        Arc::new(ScriptedLedger::new()),
        None,
        StateBroadcaster::new(16),
        settings,
    )
    .await;
    (tracker, pool)
}

#[tokio::test]
async fn test_allowance_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dopa.db");

    {
        let (tracker, pool) = open_tracker(&db_path).await;
        tracker.set_allowance("wallet-a", 7.5).await.unwrap();
        pool.close().await;
    }

    let (tracker, _pool) = open_tracker(&db_path).await;
    let finance = tracker.get_state().await.finance;
    assert_eq!(finance.wallet_id.as_deref(), Some("wallet-a"));
    assert_eq!(finance.total_allowance, 7.5);
    assert_eq!(finance.cumulative_settled, 0.0);
}

#[tokio::test]
async fn test_score_and_settled_restored_and_clamped() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dopa.db");

    {
        let pool = init_database(&db_path).await.unwrap();
        let store = SqliteCheckpointStore::new(pool.clone());
        store.save_score(3210.5).await.unwrap();
        // Hand-edited row pushing settled past the allowance
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES
             ('finance_wallet_id', 'wallet-b'),
             ('finance_total_allowance', '4'),
             ('finance_cumulative_settled', '6.5')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let (tracker, _pool) = open_tracker(&db_path).await;
    let state = tracker.get_state().await;
    assert_eq!(state.score, 3210.5);
    assert_eq!(state.finance.total_allowance, 4.0);
    assert_eq!(state.finance.cumulative_settled, 4.0);
}

#[tokio::test]
async fn test_runtime_settings_persisted_on_first_start() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dopa.db");

    let (tracker, pool) = open_tracker(&db_path).await;
    assert_eq!(tracker.settings(), &RuntimeSettings::default());

    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM settings WHERE key IN
         ('tick_interval_ms', 'sync_threshold', 'analyzer_interval_ms', 'ledger_timeout_ms')",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 4);
}

#[tokio::test]
async fn test_garbage_row_does_not_drop_bound_wallet() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("dopa.db");

    {
        let (tracker, pool) = open_tracker(&db_path).await;
        tracker.set_allowance("wallet-c", 10.0).await.unwrap();
        let store = SqliteCheckpointStore::new(pool.clone());
        store.save_score(4000.0).await.unwrap();
        sqlx::query("UPDATE settings SET value = '4.0x' WHERE key = 'finance_cumulative_settled'")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    let (tracker, _pool) = open_tracker(&db_path).await;
    let state = tracker.get_state().await;
    assert_eq!(state.score, 4000.0);
    assert_eq!(state.finance.wallet_id.as_deref(), Some("wallet-c"));
    assert_eq!(state.finance.total_allowance, 10.0);
}
