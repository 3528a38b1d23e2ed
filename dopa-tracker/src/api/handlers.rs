//! HTTP request handlers

use crate::api::server::AppContext;
use crate::error::Error;
use crate::features::{FrameBuffer, SpectrumSnapshot};
use crate::tracker::{SessionInfo, TrackerState};
use axum::{extract::State, http::StatusCode, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dopa_common::events::FinanceState;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    source: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    final_score: f64,
}

#[derive(Debug, Deserialize)]
pub struct AllowanceRequest {
    wallet_id: String,
    amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    width: u32,
    height: u32,
    /// Base64-encoded RGBA8 pixels, row-major
    rgba: String,
}

#[derive(Debug, Deserialize)]
pub struct SpectrumRequest {
    bins: Vec<u8>,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn error_response(e: Error) -> ApiError {
    let code = match &e {
        Error::BadRequest(_) | Error::Capture(_) => StatusCode::BAD_REQUEST,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code.is_server_error() {
        warn!("Request failed: {}", e);
    } else {
        debug!("Request rejected: {}", e);
    }

    (
        code,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

fn ok() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
    })
}

// ============================================================================
// Health & State
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "dopa-tracker".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /state - Score, latest features, finance and session
pub async fn get_state(State(ctx): State<AppContext>) -> Json<TrackerState> {
    Json(ctx.tracker.get_state().await)
}

// ============================================================================
// Session Control
// ============================================================================

/// POST /session/start - Begin tracking a capture source
pub async fn start_session(
    State(ctx): State<AppContext>,
    Json(req): Json<StartSessionRequest>,
) -> Result<Json<SessionInfo>, ApiError> {
    ctx.tracker
        .start_session(&req.source)
        .await
        .map(Json)
        .map_err(error_response)
}

/// POST /session/stop - End the active session
pub async fn stop_session(
    State(ctx): State<AppContext>,
) -> Result<Json<StopSessionResponse>, ApiError> {
    ctx.tracker
        .stop_session()
        .await
        .map(|final_score| Json(StopSessionResponse { final_score }))
        .map_err(error_response)
}

// ============================================================================
// Allowance
// ============================================================================

/// POST /allowance - Bind a wallet with a fresh allowance
pub async fn set_allowance(
    State(ctx): State<AppContext>,
    Json(req): Json<AllowanceRequest>,
) -> Result<Json<FinanceState>, ApiError> {
    ctx.tracker
        .set_allowance(&req.wallet_id, req.amount)
        .await
        .map(Json)
        .map_err(error_response)
}

/// DELETE /allowance - Unbind the wallet
pub async fn revoke_allowance(State(ctx): State<AppContext>) -> Json<FinanceState> {
    Json(ctx.tracker.revoke_allowance().await)
}

// ============================================================================
// Capture Ingestion
// ============================================================================

/// POST /capture/frame - Push the latest downsampled frame
pub async fn push_frame(
    State(ctx): State<AppContext>,
    Json(req): Json<FrameRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let pixels = STANDARD
        .decode(req.rgba.as_bytes())
        .map_err(|e| error_response(Error::Capture(format!("invalid base64: {}", e))))?;

    let frame = FrameBuffer::new(req.width, req.height, pixels);
    if !frame.is_valid() {
        return Err(error_response(Error::Capture(format!(
            "expected {} bytes for {}x{} RGBA, got {}",
            frame.pixel_count() * FrameBuffer::CHANNELS,
            req.width,
            req.height,
            frame.pixels().len()
        ))));
    }

    ctx.tracker.capture().push_frame(frame);
    Ok(ok())
}

/// POST /capture/spectrum - Push the latest frequency spectrum
pub async fn push_spectrum(
    State(ctx): State<AppContext>,
    Json(req): Json<SpectrumRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    if req.bins.is_empty() {
        return Err(error_response(Error::Capture(
            "spectrum has no bins".to_string(),
        )));
    }

    ctx.tracker
        .capture()
        .push_spectrum(SpectrumSnapshot::new(req.bins));
    Ok(ok())
}
