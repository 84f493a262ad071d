//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Router,
};
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use archiver::{Orchestrator, SharedRegistry, StagingStore};

use crate::server::routes::{archive_handler, health_handler, search_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: SharedRegistry,
    pub staging: Arc<StagingStore>,
    /// Bounds concurrent archive jobs; requests past the limit queue
    pub workers: Arc<Semaphore>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, worker_count: usize) -> Self {
        let registry = orchestrator.registry().clone();
        let staging = orchestrator.staging().clone();
        Self {
            orchestrator,
            registry,
            staging,
            workers: Arc::new(Semaphore::new(worker_count.max(1))),
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    // CORS configuration - the API is read-only, GET is all it serves
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/search", get(search_handler))
        .route("/api/archive", get(archive_handler))
        .route("/health", get(health_handler))
        .layer(Extension(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
