use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    query: String,
    matches: Vec<CompanyMatch>,
}

#[derive(Serialize)]
pub struct CompanyMatch {
    name: String,
    identifier: String,
}

/// Company search endpoint
///
/// Returns registry candidates for a query without starting a job, so
/// a caller can disambiguate before requesting an archive.
pub async fn search_handler(
    Extension(state): Extension<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let query = params.q.as_deref().unwrap_or("").trim().to_string();
    if query.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "query parameter q is required" })),
        )
            .into_response();
    }

    let matches = state
        .orchestrator
        .search(&query)
        .into_iter()
        .map(|company| CompanyMatch {
            name: company.name,
            identifier: company.identifier,
        })
        .collect();

    Json(SearchResponse { query, matches }).into_response()
}

#[cfg(test)]
mod tests {
    use crate::server::routes::testutil::app_with_source;
    use archiver::testing::MockSource;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_json(
        app: axum::Router,
        uri: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn returns_matching_companies() {
        let (app, _root) = app_with_source(MockSource::new());

        let (status, json) = get_json(app, "/api/search?q=acme").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["matches"].as_array().unwrap().len(), 1);
        assert_eq!(json["matches"][0]["identifier"], "ACME");
        assert_eq!(json["matches"][0]["name"], "Acme Corp");
    }

    #[tokio::test]
    async fn unmatched_query_returns_empty_list() {
        let (app, _root) = app_with_source(MockSource::new());

        let (status, json) = get_json(app, "/api/search?q=umbrella").await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["matches"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let (app, _root) = app_with_source(MockSource::new());
        let (status, _) = get_json(app, "/api/search?q=%20%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (app, _root) = app_with_source(MockSource::new());
        let (status, _) = get_json(app, "/api/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
