//! HTTP control surface
//!
//! Session control, allowance management, capture ingestion and an SSE
//! stream of pipeline events.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
