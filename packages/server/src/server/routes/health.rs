use axum::{extract::Extension, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    registry: RegistryHealth,
    staging: StagingHealth,
}

#[derive(Serialize)]
pub struct RegistryHealth {
    status: String,
    companies: usize,
    loaded_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct StagingHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Health check endpoint
///
/// Checks:
/// - Registry snapshot is present and non-empty
/// - Staging root exists or can be created
///
/// Returns 200 OK if all systems are healthy, 503 Service Unavailable otherwise.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.registry.snapshot();
    let registry = RegistryHealth {
        status: if snapshot.is_empty() { "empty" } else { "ok" }.to_string(),
        companies: snapshot.len(),
        loaded_at: snapshot.loaded_at(),
    };

    let staging = match std::fs::create_dir_all(state.staging.root()) {
        Ok(()) => StagingHealth {
            status: "ok".to_string(),
            error: None,
        },
        Err(e) => StagingHealth {
            status: "error".to_string(),
            error: Some(e.to_string()),
        },
    };

    let is_healthy = registry.status == "ok" && staging.status == "ok";
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            registry,
            staging,
        }),
    )
}

#[cfg(test)]
mod tests {
    use crate::server::routes::testutil::app_with_source;
    use archiver::testing::MockSource;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthy_when_registry_loaded_and_staging_writable() {
        let (app, _root) = app_with_source(MockSource::new());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["registry"]["companies"], 3);
        assert_eq!(json["staging"]["status"], "ok");
    }

    #[tokio::test]
    async fn unhealthy_when_staging_root_is_not_a_directory() {
        use archiver::testing::sample_registry;
        use archiver::{Orchestrator, PipelineConfig, SharedRegistry, StagingStore};
        use std::sync::Arc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let occupied = dir.path().join("occupied");
        std::fs::write(&occupied, b"x").unwrap();

        let orchestrator = Arc::new(Orchestrator::new(
            SharedRegistry::new(sample_registry()),
            Arc::new(StagingStore::new(&occupied, Duration::from_secs(60))),
            Arc::new(MockSource::new()),
            PipelineConfig::default(),
        ));
        let app = crate::server::app::build_app(crate::server::app::AppState::new(
            orchestrator,
            2,
        ));

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
