//! Ledger service client
//!
//! The ledger moves tokens between the user's delegated allowance and the
//! treasury. Its acknowledgment is the only evidence that money moved, so
//! callers advance finance state on `Ok` and nothing else.

use crate::error::{Error, Result};
use async_trait::async_trait;
use dopa_common::events::SettlementDirection;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Token decimal places used on the wire
pub const TOKEN_DECIMALS: i32 = 6;

/// Smallest amount the ledger can move (`10^-TOKEN_DECIMALS`)
pub const TOKEN_UNIT: f64 = 1e-6;

const USER_AGENT: &str = concat!("dopa-tracker/", env!("CARGO_PKG_VERSION"));

/// Positive acknowledgment from the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    /// Transaction signature / receipt identifier
    pub receipt_id: String,
}

/// External ledger operations
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Move `amount` from the user's allowance to the treasury
    async fn slash(&self, wallet_id: &str, amount: f64) -> Result<LedgerReceipt>;

    /// Move `amount` from the treasury back to the user
    async fn refund(&self, wallet_id: &str, amount: f64) -> Result<LedgerReceipt>;

    /// Dispatch by direction
    async fn settle(
        &self,
        direction: SettlementDirection,
        wallet_id: &str,
        amount: f64,
    ) -> Result<LedgerReceipt> {
        match direction {
            SettlementDirection::Slash => self.slash(wallet_id, amount).await,
            SettlementDirection::Refund => self.refund(wallet_id, amount).await,
        }
    }
}

/// Round an amount to the token's on-chain precision
pub fn round_to_token_units(amount: f64) -> f64 {
    let scale = 10f64.powi(TOKEN_DECIMALS);
    (amount * scale).round() / scale
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettlementRequest<'a> {
    user_public_key: &'a str,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct SettlementResponse {
    success: bool,
    #[serde(default)]
    tx: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Ledger reached over HTTP
///
/// `POST {base}/api/slash` and `POST {base}/api/refund` with
/// `{"userPublicKey", "amount"}`; the service answers
/// `{"success", "tx"?, "error"?}`.
pub struct HttpLedger {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpLedger {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Ledger(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        direction: SettlementDirection,
        wallet_id: &str,
        amount: f64,
    ) -> Result<LedgerReceipt> {
        let amount = round_to_token_units(amount);
        if amount <= 0.0 {
            return Err(Error::Ledger(format!(
                "{} amount rounds to zero at {} decimals",
                direction, TOKEN_DECIMALS
            )));
        }

        let url = format!("{}/api/{}", self.base_url, direction);
        debug!(%url, amount, "Sending settlement to ledger");

        let response = self
            .http_client
            .post(&url)
            .json(&SettlementRequest {
                user_public_key: wallet_id,
                amount,
            })
            .send()
            .await
            .map_err(|e| Error::Ledger(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            // The service reports failures as JSON with an error field
            let detail = serde_json::from_str::<SettlementResponse>(&error_text)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(error_text);
            return Err(Error::Ledger(format!("HTTP {}: {}", status.as_u16(), detail)));
        }

        let body: SettlementResponse = response
            .json()
            .await
            .map_err(|e| Error::Ledger(format!("Invalid ledger response: {}", e)))?;

        parse_response(body)
    }
}

fn parse_response(body: SettlementResponse) -> Result<LedgerReceipt> {
    if !body.success {
        return Err(Error::Ledger(
            body.error
                .unwrap_or_else(|| "ledger reported failure".to_string()),
        ));
    }

    match body.tx {
        Some(receipt_id) => Ok(LedgerReceipt { receipt_id }),
        None => Err(Error::Ledger(
            "ledger reported success without a receipt".to_string(),
        )),
    }
}

#[async_trait]
impl Ledger for HttpLedger {
    async fn slash(&self, wallet_id: &str, amount: f64) -> Result<LedgerReceipt> {
        self.post(SettlementDirection::Slash, wallet_id, amount).await
    }

    async fn refund(&self, wallet_id: &str, amount: f64) -> Result<LedgerReceipt> {
        self.post(SettlementDirection::Refund, wallet_id, amount).await
    }
}
