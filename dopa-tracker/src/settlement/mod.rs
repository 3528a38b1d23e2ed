//! Settlement: keeps locked funds proportional to the engagement score

pub mod ledger;
pub mod reconciler;

pub use ledger::{round_to_token_units, HttpLedger, Ledger, LedgerReceipt, TOKEN_DECIMALS, TOKEN_UNIT};
pub use reconciler::{
    ReconcileOutcome, SettlementIntent, SettlementReconciler, DEFAULT_SYNC_THRESHOLD,
};
