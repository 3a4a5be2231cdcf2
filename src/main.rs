//! MathSage · Math Solver & Practice Backend
//!
//! - Axum HTTP + WebSocket API
//! - Reasoning-service integration (via environment variables)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT          : u16 (default 3000)
//!   OPENAI_API_KEY    : enables the reasoning client if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL  : default "gpt-4o-mini" (hints)
//!   OPENAI_STRONG_MODEL   : default "gpt-4o" (solve/generate/grade)
//!   OPENAI_TIMEOUT_SECS : per-call timeout, default 30
//!   SOLVER_CONFIG_PATH  : path to TOML config (prompts + stage pacing)
//!   LOG_LEVEL    : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default), "compact" or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod config;
mod ingest;
mod validate;
mod render;
mod reasoner;
mod pipeline;
mod practice;
mod state;
mod protocol;
mod routes;
#[cfg(test)]
mod testkit;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (controllers, reasoning client, prompts).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "mathsage_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    error!(target: "mathsage_backend", error = %e, "failed to install shutdown handler");
    return;
  }
  info!(target: "mathsage_backend", "shutdown signal received");
}
