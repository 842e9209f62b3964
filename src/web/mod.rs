//! Web server module.

mod handlers;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::notify::Dispatcher;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub dispatcher: Dispatcher,
}

/// Build the router with all routes.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Node ingestion
        .route("/api/report/{id}", post(handlers::handle_report))
        // Read surfaces
        .route("/api/sites", get(handlers::handle_get_sites))
        .route("/api/sites/{id}/history", get(handlers::handle_site_history))
        .route("/api/servers", get(handlers::handle_get_servers))
        .route("/api/servers/{id}/metrics", get(handlers::handle_server_metrics))
        .route("/api/servers/{id}/history", get(handlers::handle_server_history))
        // Administration
        .route(
            "/api/admin/{collection}/{id}/reorder",
            post(handlers::handle_reorder),
        )
        .route(
            "/api/admin/notifier",
            get(handlers::handle_get_notifier).put(handlers::handle_update_notifier),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}

/// Web server for vigil.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            state: AppState { store, dispatcher },
        }
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = router(self.state);

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
