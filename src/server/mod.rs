//! HTTP API.
//!
//! | Route | Guarded | Purpose |
//! |---|---|---|
//! | `GET /health` | no | task store health |
//! | `POST /uploads` | yes | queue a table upload |
//! | `GET /uploads` | yes | recent tasks |
//! | `GET /uploads/:task_id/status` | yes | rendered task status |
//! | `POST /uploads/:task_id/cancel` | yes | cancel an unfinished task |
//! | `POST /tables` | yes | list source tables |

pub mod guard;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::AppError;
use crate::state::AppState;
use crate::tasks::IngestClientFactory;

/// Builds the router with the session guard on every upload route.
pub fn build_router<F: IngestClientFactory>(state: Arc<AppState<F>>) -> Router {
    let protected = Router::new()
        .route(
            "/uploads",
            post(handlers::submit_upload::<F>).get(handlers::list_uploads::<F>),
        )
        .route("/uploads/:task_id/status", get(handlers::upload_status::<F>))
        .route("/uploads/:task_id/cancel", post(handlers::cancel_upload::<F>))
        .route("/tables", post(handlers::list_tables::<F>))
        .route_layer(middleware::from_fn(guard::require_session));

    Router::new()
        .route("/health", get(handlers::health::<F>))
        .merge(protected)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serves the API until Ctrl+C or SIGTERM.
pub async fn serve<F: IngestClientFactory>(
    state: Arc<AppState<F>>,
    addr: SocketAddr,
) -> Result<(), AppError> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind {addr}: {e}")))?;

    info!("[SERVER] Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {e}")))?;

    info!("[SERVER] Shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("[SERVER] Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("[SERVER] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
