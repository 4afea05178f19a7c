use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use pipeline_cloud::Publisher;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Level};

use crate::reporter::MetricReporter;

pub const CONFIRMATION: &str = "Metrics received and sent to Pub/Sub.";
pub const PUBLISH_FAILED: &str = "Error processing metrics.";
pub const INVALID_JSON: &str = "Invalid JSON payload.";

#[derive(Clone)]
pub struct IngestState {
    pub publisher: Arc<dyn Publisher>,
    pub reporter: MetricReporter,
    pub topic: Arc<str>,
}

pub fn router(state: IngestState) -> Router {
    Router::new()
        .route("/metrics", post(ingest_metrics))
        .layer(
            TraceLayer::new_for_http()
                .on_request(tower_http::trace::DefaultOnRequest::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Re-encodes the body compactly, keeping key order. An empty body is `{}`.
pub fn encode_payload(body: &[u8]) -> serde_json::Result<Bytes> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Bytes::from_static(b"{}"));
    }
    let value: serde_json::Value = serde_json::from_slice(body)?;
    serde_json::to_vec(&value).map(Bytes::from)
}

async fn ingest_metrics(
    State(state): State<IngestState>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let span = tracing::info_span!("ingest", request_id = %uuid::Uuid::new_v4().simple());
    handle_ingest(state, body).instrument(span).await
}

async fn handle_ingest(state: IngestState, body: Bytes) -> (StatusCode, &'static str) {
    let start = Instant::now();

    let payload = match encode_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "rejected malformed JSON body");
            return (StatusCode::BAD_REQUEST, INVALID_JSON);
        }
    };

    let message_id = match state.publisher.publish(&state.topic, payload).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(topic = %state.topic, error = %e, "error publishing message");
            return (StatusCode::INTERNAL_SERVER_ERROR, PUBLISH_FAILED);
        }
    };

    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    tracing::debug!(%message_id, latency_ms, "published metrics payload");

    state.reporter.record_ingestion().await;
    state.reporter.record_latency(latency_ms).await;

    (StatusCode::OK, CONFIRMATION)
}
