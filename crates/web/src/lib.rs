//! Browser side of tgdrive: the upload form a handoff link points to and
//! the multipart endpoint that relays the submitted file.
//!
//! [`web_routes()`] builds the axum `Router`; [`serve()`] runs it until a
//! cancellation token fires.

pub mod error;
pub mod state;
mod templates;
pub mod upload;

use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::get,
    },
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tracing::info,
};

pub use {
    error::{Error, Result},
    state::AppState,
};

pub const INDEX_TEXT: &str =
    "Telegram → Google Drive upload server. Use /upload?token=... to upload.";

/// All browser-facing routes.
pub fn web_routes(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_body_bytes);

    let router = Router::new()
        .route("/", get(|| async { INDEX_TEXT }))
        .route("/health", get(|| async { "ok" }))
        .route(
            "/upload",
            get(upload::upload_form_handler)
                .post(upload::upload_submit_handler)
                .layer(upload_limit),
        );

    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics", get(metrics::prometheus_metrics_handler));

    router.with_state(state)
}

/// Serve `router` on `listener`, draining in-flight requests once `cancel`
/// fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "upload server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

#[cfg(feature = "prometheus")]
mod metrics {
    use axum::{
        extract::State,
        http::{StatusCode, header},
        response::IntoResponse,
    };

    use crate::AppState;

    pub async fn prometheus_metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
        match state.metrics_handle.as_ref() {
            Some(handle) => (
                StatusCode::OK,
                [(
                    header::CONTENT_TYPE,
                    "text/plain; version=0.0.4; charset=utf-8",
                )],
                handle.render(),
            ),
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CONTENT_TYPE, "text/plain")],
                "Metrics not enabled".to_string(),
            ),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
