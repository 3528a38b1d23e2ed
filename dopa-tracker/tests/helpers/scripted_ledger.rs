//! Fake ledger with call recording and an optional gate

use async_trait::async_trait;
use dopa_common::events::SettlementDirection;
use dopa_tracker::settlement::{Ledger, LedgerReceipt};
use dopa_tracker::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerCall {
    pub direction: SettlementDirection,
    pub wallet_id: String,
    pub amount: f64,
}

/// Ledger whose behaviour is scripted by the test
///
/// A gated ledger holds every call until the test releases a permit, which
/// keeps a settlement in flight for as long as the test needs.
pub struct ScriptedLedger {
    calls: Mutex<Vec<LedgerCall>>,
    failing: AtomicBool,
    gate: Option<Semaphore>,
}

impl ScriptedLedger {
    /// Acknowledges every call immediately
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            gate: None,
        }
    }

    /// Holds every call until [`ScriptedLedger::release`]
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Let `n` held calls complete
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn record(
        &self,
        direction: SettlementDirection,
        wallet_id: &str,
        amount: f64,
    ) -> Result<LedgerReceipt> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(LedgerCall {
                direction,
                wallet_id: wallet_id.to_string(),
                amount,
            });
            calls.len()
        };

        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Ledger("Network error: connection refused".to_string()))
        } else {
            Ok(LedgerReceipt {
                receipt_id: format!("sig-{}-{}", direction, n),
            })
        }
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn slash(&self, wallet_id: &str, amount: f64) -> Result<LedgerReceipt> {
        self.record(SettlementDirection::Slash, wallet_id, amount).await
    }

    async fn refund(&self, wallet_id: &str, amount: f64) -> Result<LedgerReceipt> {
        self.record(SettlementDirection::Refund, wallet_id, amount).await
    }
}
