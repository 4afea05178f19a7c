use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use pipeline_cloud::Warehouse;
use pipeline_core::config::Config;
use pipeline_core::model::row::AnomalyQuery;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AnomalyState {
    pub warehouse: Arc<dyn Warehouse>,
    pub query: Arc<AnomalyQuery>,
}

impl AnomalyState {
    pub fn new(warehouse: Arc<dyn Warehouse>, cfg: &Config) -> Self {
        Self {
            warehouse,
            query: Arc::new(AnomalyQuery {
                dataset: cfg.dataset.clone(),
                table: cfg.table.clone(),
                model: cfg.anomaly_model.clone(),
                threshold: cfg.anomaly_threshold,
                limit: cfg.anomaly_limit,
            }),
        }
    }
}

pub fn router(state: AnomalyState) -> Router {
    Router::new()
        .route("/get_anomalies", get(get_anomalies))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_anomalies(State(state): State<AnomalyState>) -> Response {
    match state.warehouse.detect_anomalies(&state.query).await {
        Ok(rows) => {
            tracing::debug!(count = rows.len(), "anomaly query returned");
            Json(rows).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "error fetching anomalies");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}
