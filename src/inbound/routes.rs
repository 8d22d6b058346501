//! HTTP surface of the inbound entry point.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tracing::error;

use super::{InboundHandler, InboundOutcome, REJECT_INTERNAL};

#[derive(Debug, Deserialize)]
pub struct InboundQuery {
    pub to: String,
    pub from: String,
}

/// Build the inbound routes: `POST /inbound` and `GET /health`.
pub fn inbound_routes(handler: Arc<InboundHandler>, max_message_bytes: usize) -> Router {
    Router::new()
        .route("/inbound", post(receive))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_message_bytes))
        .with_state(handler)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "mail-relay"
    }))
}

async fn receive(
    State(handler): State<Arc<InboundHandler>>,
    Query(query): Query<InboundQuery>,
    body: Bytes,
) -> impl IntoResponse {
    match handler.handle(&query.to, &query.from, &body).await {
        Ok(outcome @ InboundOutcome::Delivered { .. }) => (StatusCode::OK, Json(outcome)),
        Ok(outcome @ InboundOutcome::Rejected { .. }) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(outcome))
        }
        Err(e) => {
            error!(destination = %query.to, error = %e, "Inbound message failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InboundOutcome::Rejected {
                    reason: REJECT_INTERNAL.to_string(),
                }),
            )
        }
    }
}
