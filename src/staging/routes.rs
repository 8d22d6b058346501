//! HTTP retrieval endpoint for staged blobs: `GET /{id}`.
//!
//! Any path that is not a lowercase canonical UUID, or that names a missing
//! blob, gets a generic 400 so the endpoint reveals nothing about what is
//! stored.

use std::sync::LazyLock;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use regex::Regex;
use tracing::{debug, error};

use super::BlobStager;
use crate::store::traits::content_disposition;

static BLOB_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("blob id regex is valid")
});

/// Whether `id` has the canonical 8-4-4-4-12 lowercase hex form.
pub fn is_blob_id(id: &str) -> bool {
    BLOB_ID.is_match(id)
}

/// Build the retrieval routes. Paths no route matches get the same 400.
pub fn retrieval_routes(stager: BlobStager) -> Router {
    Router::new()
        .route("/{id}", get(fetch_blob))
        .fallback(unmatched)
        .with_state(stager)
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad request").into_response()
}

/// Generic 400 for any path or method nothing serves.
pub async fn unmatched() -> Response {
    bad_request()
}

async fn fetch_blob(State(stager): State<BlobStager>, Path(id): Path<String>) -> Response {
    let id = id.to_lowercase();
    debug!(blob_id = %id, "Blob retrieval requested");
    if !is_blob_id(&id) {
        return bad_request();
    }

    let blob = match stager.get(&id).await {
        Ok(Some(blob)) => blob,
        Ok(None) => return bad_request(),
        Err(e) => {
            error!(blob_id = %id, error = %e, "Blob lookup failed");
            return bad_request();
        }
    };

    let content_type = HeaderValue::from_str(&blob.metadata.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_bytes(content_disposition(&blob.metadata.filename).as_bytes())
        .unwrap_or(HeaderValue::from_static("attachment"));

    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        blob.body,
    )
        .into_response()
}
