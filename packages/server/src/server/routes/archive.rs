use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{Extension, Query};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use archiver::{ArchiveResponse, PipelineError, ServeGuard, YearRange};

use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct ArchiveParams {
    q: Option<String>,
    /// Inclusive lower bound on document year
    from: Option<i32>,
    /// Inclusive upper bound on document year
    to: Option<i32>,
}

/// Streams the spooled zip while holding the serve guard, so the sweep
/// cannot reclaim the staging directory mid-download. The guard drops
/// with the stream, including on client disconnect.
struct ArchiveStream {
    inner: ReaderStream<tokio::fs::File>,
    _guard: ServeGuard,
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Archive download endpoint
///
/// Resolves the query, fetches the company's documents, and streams
/// them back as a zip. Partial results are served with warning headers
/// rather than failing the request.
pub async fn archive_handler(
    Extension(state): Extension<AppState>,
    Query(params): Query<ArchiveParams>,
) -> Response {
    let query = params.q.unwrap_or_default();
    let range = YearRange::new(params.from, params.to);

    // Queue behind the worker pool. The permit covers the job itself;
    // streaming the finished archive does not occupy a worker.
    let _permit = match state.workers.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down");
        }
    };

    match state.orchestrator.run(&query, &range).await {
        Ok(archive) => serve_archive(archive),
        Err(e) => {
            if e.is_user_error() {
                debug!(error = %e, "archive request rejected");
            } else {
                error!(error = %e, "archive request failed");
            }
            error_response(status_for(&e), &e.to_string())
        }
    }
}

fn serve_archive(archive: ArchiveResponse) -> Response {
    let filename = archive.filename();
    let job_status = archive.job.status.to_string();
    let failed = archive.failed.len();

    let file = tokio::fs::File::from_std(archive.archive);
    let stream = ArchiveStream {
        inner: ReaderStream::new(file),
        _guard: archive.guard,
    };

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&job_status) {
        headers.insert("x-archive-status", value);
    }
    if failed > 0 {
        if let Ok(value) = HeaderValue::from_str(&failed.to_string()) {
            headers.insert("x-documents-failed", value);
        }
    }
    response
}

fn status_for(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::EmptyQuery => StatusCode::BAD_REQUEST,
        PipelineError::CompanyNotFound { .. } => StatusCode::NOT_FOUND,
        PipelineError::Discovery { .. } | PipelineError::FetchFailed { .. } => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::Registry(_) | PipelineError::Storage(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PipelineError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        PipelineError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
