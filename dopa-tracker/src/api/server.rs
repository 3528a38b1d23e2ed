//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::tracker::Tracker;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub tracker: Arc<Tracker>,
}

/// Build the router with every route attached
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))

        // State snapshot
        .route("/state", get(super::handlers::get_state))

        // Session control
        .route("/session/start", post(super::handlers::start_session))
        .route("/session/stop", post(super::handlers::stop_session))

        // Allowance management
        .route(
            "/allowance",
            post(super::handlers::set_allowance).delete(super::handlers::revoke_allowance),
        )

        // Capture ingestion
        .route("/capture/frame", post(super::handlers::push_frame))
        .route("/capture/spectrum", post(super::handlers::push_spectrum))

        // SSE event stream
        .route("/events", get(super::sse::event_stream))

        .with_state(ctx)

        .layer(TraceLayer::new_for_http())

        // Capture producers run in a browser context on another origin
        .layer(CorsLayer::permissive())
}

/// Serve the API on `port` until `shutdown` resolves
pub async fn run<F>(port: u16, ctx: AppContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(ctx);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
