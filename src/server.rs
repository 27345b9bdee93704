//! Query service: serves the camera registry over HTTP using Axum.

use std::future::Future;
use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use url::Url;

use crate::registry::CameraRegistry;
use crate::web_server::{cameras, middleware::no_cache_middleware};
use crate::{HubError, HubResult};

/// Application state shared across handlers. Read-only: handlers only ever
/// take registry snapshots.
#[derive(Clone)]
pub struct AppState {
    pub registry: CameraRegistry,
    pub stream_base: Url,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/list_cameras", get(cameras::list_cameras))
        .route("/api/cameras", get(cameras::list_camera_details))
        .route("/api/cameras/{name}", get(cameras::get_camera))
        .route("/api/status", get(cameras::hub_status))
        .fallback(cameras::not_found)
        .layer(middleware::from_fn(no_cache_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the query endpoint. Failing to bind is fatal at startup.
pub async fn bind(host: &str, port: u16) -> HubResult<TcpListener> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|e| HubError::App(format!("Failed to bind to {addr}: {e}")))
}

/// Serve until `shutdown` resolves.
pub async fn serve<S>(listener: TcpListener, state: Arc<AppState>, shutdown: S) -> HubResult<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("Query service listening on http://{addr}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| HubError::App(format!("Server error: {e}")))?;

    info!("Query service stopped");
    Ok(())
}
