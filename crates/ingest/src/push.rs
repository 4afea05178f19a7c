//! Receiver for Pub/Sub push deliveries: decodes each pushed message and
//! appends one row to the warehouse table.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pipeline_cloud::Warehouse;
use pipeline_core::model::row::MetricRow;
use serde_json::Value;
use tower_http::trace::TraceLayer;

pub const STORED: &str = "Success";
pub const NO_MESSAGE: &str = "Bad Request: No Pub/Sub message found";
pub const INSERT_FAILED: &str = "Error inserting data";
pub const INTERNAL_ERROR: &str = "Internal Server Error";

#[derive(Clone)]
pub struct PushState {
    pub warehouse: Arc<dyn Warehouse>,
}

pub fn router(state: PushState) -> Router {
    Router::new()
        .route("/", post(receive_push))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, PartialEq)]
enum PushRejection {
    NoMessage,
    Malformed(String),
}

fn extract_row(body: &[u8]) -> Result<MetricRow, PushRejection> {
    let envelope: Value = serde_json::from_slice(body)
        .map_err(|e| PushRejection::Malformed(format!("envelope is not JSON: {e}")))?;
    let Some(message) = envelope.get("message") else {
        return Err(PushRejection::NoMessage);
    };

    let data = message
        .get("data")
        .and_then(Value::as_str)
        .ok_or_else(|| PushRejection::Malformed("message has no data".to_string()))?;
    let decoded = STANDARD
        .decode(data)
        .map_err(|e| PushRejection::Malformed(format!("data is not base64: {e}")))?;
    let text = String::from_utf8(decoded)
        .map_err(|e| PushRejection::Malformed(format!("data is not utf-8: {e}")))?;
    let payload: Value = serde_json::from_str(&text)
        .map_err(|e| PushRejection::Malformed(format!("data is not JSON: {e}")))?;
    if !payload.is_object() {
        return Err(PushRejection::Malformed("data is not a JSON object".to_string()));
    }

    Ok(MetricRow::from_message(&payload))
}

async fn receive_push(State(state): State<PushState>, body: Bytes) -> (StatusCode, &'static str) {
    let row = match extract_row(&body) {
        Ok(row) => row,
        Err(PushRejection::NoMessage) => {
            tracing::warn!("push request carried no Pub/Sub message");
            return (StatusCode::BAD_REQUEST, NO_MESSAGE);
        }
        Err(PushRejection::Malformed(reason)) => {
            tracing::error!(%reason, "error processing message");
            return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    match state.warehouse.insert_rows(std::slice::from_ref(&row)).await {
        Ok(()) => {
            tracing::info!("metrics successfully stored");
            (StatusCode::OK, STORED)
        }
        Err(e) => {
            tracing::error!(error = %e, "error inserting rows");
            (StatusCode::INTERNAL_SERVER_ERROR, INSERT_FAILED)
        }
    }
}
