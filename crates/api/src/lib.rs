//! HTTP status surface served alongside the email worker.
//!
//! Endpoints:
//! - GET  /health - liveness
//! - GET  /api/v1/status - API version
//! - POST /api/v1/test-email-log - write a synthetic log through the active storage

pub mod routes;
pub mod state;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use courier_common::error::StartupError;

use crate::routes::create_router;
use crate::state::AppState;

/// Bind the listener. Failing to bind is a startup error.
pub async fn bind(port: u16) -> Result<TcpListener, StartupError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    Ok(listener)
}

/// Serve the router until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    request_timeout: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
