// src/api/mod.rs

//! HTTP route layer
//!
//! A thin axum router over the aggregator and the health harness. Every
//! response carries a `Cache-Control` header built from the configured
//! presets.

use axum::{Router, routing::get};
use tokio::net::TcpListener;

use crate::error::Result;

pub mod error_response;
pub mod routes;
pub mod state;

pub use error_response::{DiagnosticReport, ErrorClass, RouteError, ToHttpStatus, classify};
pub use state::AppState;

/// Create the router with all route definitions
///
/// # Routes
///
/// - `GET /manga/:id` - Resolve one entry (`?thumbnail=N`, `?preview=true`)
/// - `GET /manga` - Resolve a batch (`?ids=1,2,3&fallback=true`)
/// - `GET /sources/:source/pages/:page` - One listing page from a source
/// - `GET /health` - Provider health report
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/manga", get(routes::get_manga_batch))
        .route("/manga/:id", get(routes::get_manga))
        .route("/sources/:source/pages/:page", get(routes::get_source_page))
        .route("/health", get(routes::health_check))
        .with_state(state)
}

/// Serve the router on the configured bind address until Ctrl-C.
pub async fn start_server(state: AppState) -> Result<()> {
    let bind = state.config.server.bind.clone();
    let app = create_router(state);

    let listener = TcpListener::bind(&bind).await?;
    log::info!("Listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::warn!("Failed to listen for shutdown signal: {}", e);
            }
            log::info!("Shutting down");
        })
        .await?;
    Ok(())
}
