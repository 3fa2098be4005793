//! HTTP surface for coursetrack.
//!
//! Caller identity is established upstream by the session provider and
//! arrives in the `x-user-id` header; see [`identity::Caller`].

pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use error::ApiError;
pub use state::AppState;

use routes::{courses, enrollments, instructor};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route(
            "/enrollments",
            post(enrollments::create).get(enrollments::list),
        )
        .route("/enrollments/{id}", get(enrollments::show))
        .route("/enrollments/{id}/outline", get(enrollments::outline))
        .route("/enrollments/{id}/progress", put(enrollments::update_progress))
        .route("/courses", post(courses::create))
        .route("/courses/{id}", get(courses::show).delete(courses::delete))
        .route(
            "/courses/{id}/lessons",
            get(courses::list_lessons).post(courses::add_lesson),
        )
        .route(
            "/lessons/{id}",
            put(courses::update_lesson).delete(courses::delete_lesson),
        )
        .route("/instructor/students", get(instructor::students))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `listener` until Ctrl+C or SIGTERM.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!("Server running on {address}");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
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
