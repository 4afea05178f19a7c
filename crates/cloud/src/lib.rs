pub mod auth;
pub mod bigquery;
pub mod monitoring;
pub mod pubsub;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pipeline_core::config::Config;
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::model::row::{AnomalyQuery, AnomalyRow, MetricRow};
use pipeline_core::model::series::TimeSeriesPoint;

pub use auth::TokenSource;
pub use bigquery::BigQueryClient;
pub use monitoring::MonitoringClient;
pub use pubsub::PubSubClient;

/// One-way sink for ingested payloads.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `payload` as a single message and returns its server-assigned id.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<String>;
}

#[async_trait]
pub trait MetricWriter: Send + Sync {
    async fn write_point(&self, point: &TimeSeriesPoint) -> Result<()>;
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn insert_rows(&self, rows: &[MetricRow]) -> Result<()>;
    async fn detect_anomalies(&self, query: &AnomalyQuery) -> Result<Vec<AnomalyRow>>;
}

/// Long-lived clients, built once at startup and shared by every request.
#[derive(Clone)]
pub struct CloudClients {
    pub publisher: Arc<dyn Publisher>,
    pub metrics: Arc<dyn MetricWriter>,
    pub warehouse: Arc<dyn Warehouse>,
}

impl CloudClients {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| PipelineError::Internal(format!("failed to build HTTP client: {e}")))?;
        let tokens = TokenSource::from_config(cfg, http.clone())?;

        Ok(Self {
            publisher: Arc::new(PubSubClient::new(
                http.clone(),
                tokens.clone(),
                &cfg.pubsub_endpoint,
                &cfg.project_id,
            )),
            metrics: Arc::new(MonitoringClient::new(
                http.clone(),
                tokens.clone(),
                &cfg.monitoring_endpoint,
                &cfg.project_id,
            )),
            warehouse: Arc::new(BigQueryClient::new(
                http,
                tokens,
                &cfg.bigquery_endpoint,
                &cfg.project_id,
                &cfg.dataset,
                &cfg.table,
            )),
        })
    }
}

/// Attaches the bearer token, if any, to an outbound request.
pub(crate) async fn authorize(
    req: reqwest::RequestBuilder,
    tokens: &TokenSource,
) -> Result<reqwest::RequestBuilder> {
    Ok(match tokens.token().await? {
        Some(token) => req.bearer_auth(token),
        None => req,
    })
}

/// Reads a non-2xx response into a short error description.
pub(crate) async fn describe_failure(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    let body = body.trim();
    if body.is_empty() {
        format!("status {status}")
    } else {
        format!("status {status}: {body}")
    }
}
