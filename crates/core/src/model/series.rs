use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub const GENERIC_NODE: &str = "generic_node";

/// The two measurements derived from every successful ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricKind {
    IngestionRate,
    Latency,
}

impl MetricKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::IngestionRate => "metrics_pipeline/ingestion_rate",
            Self::Latency => "metrics_pipeline/latency",
        }
    }
}

/// Builds `custom.<domain>/<name>`.
pub fn custom_metric_type(domain: &str, name: &str) -> String {
    format!("custom.{domain}/{name}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub resource_type: String,
    pub project_id: String,
    pub location: String,
    pub namespace: String,
    pub node_id: String,
}

impl ResourceDescriptor {
    pub fn generic_node(cfg: &Config) -> Self {
        Self {
            resource_type: GENERIC_NODE.to_string(),
            project_id: cfg.project_id.clone(),
            location: cfg.region.clone(),
            namespace: cfg.namespace.clone(),
            node_id: cfg.node_id.clone(),
        }
    }

    pub fn labels(&self) -> [(&'static str, &str); 4] {
        [
            ("project_id", self.project_id.as_str()),
            ("location", self.location.as_str()),
            ("namespace", self.namespace.as_str()),
            ("node_id", self.node_id.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub metric_type: String,
    pub resource: ResourceDescriptor,
    pub end_time: DateTime<Utc>,
    pub value: f64,
}
