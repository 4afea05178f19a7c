use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind_host: String,
    pub project_id: String,
    pub region: String,
    pub namespace: String,
    pub node_id: String,
    pub topic: String,
    pub metric_domain: String,
    pub pubsub_endpoint: String,
    pub monitoring_endpoint: String,
    pub bigquery_endpoint: String,
    pub dataset: String,
    pub table: String,
    pub anomaly_model: String,
    pub anomaly_threshold: f64,
    pub anomaly_limit: usize,
    pub auth: String,
    pub access_token: Option<String>,
    pub metadata_endpoint: String,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_host: "0.0.0.0".to_string(),
            project_id: String::new(),
            region: "us-central1".to_string(),
            namespace: "default".to_string(),
            node_id: "metrics-api-node".to_string(),
            topic: "metrics-topic".to_string(),
            metric_domain: "googleapis.com".to_string(),
            pubsub_endpoint: "https://pubsub.googleapis.com".to_string(),
            monitoring_endpoint: "https://monitoring.googleapis.com".to_string(),
            bigquery_endpoint: "https://bigquery.googleapis.com".to_string(),
            dataset: "metrics_dataset".to_string(),
            table: "metrics_table".to_string(),
            anomaly_model: "latency_anomalies".to_string(),
            anomaly_threshold: 0.01,
            anomaly_limit: 100,
            auth: "metadata".to_string(),
            access_token: None,
            metadata_endpoint: "http://metadata.google.internal".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::default();
        let config_path = config_file_path();
        if let Some(file_overrides) = load_file_overrides(&config_path)? {
            apply_overrides(&mut cfg, file_overrides, "config file")?;
        }
        let env_overrides = load_env_overrides(|key| env::var(key).ok())?;
        apply_overrides(&mut cfg, env_overrides, "environment")?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(PipelineError::Config(
                "project_id is required (set PIPELINE_PROJECT_ID or GOOGLE_CLOUD_PROJECT)"
                    .to_string(),
            ));
        }
        if self.topic.trim().is_empty() {
            return Err(PipelineError::Config("topic cannot be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.anomaly_threshold) {
            return Err(PipelineError::Config(format!(
                "anomaly_threshold must be within [0, 1] (value={})",
                self.anomaly_threshold
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigOverrides {
    port: Option<u16>,
    bind_host: Option<String>,
    project_id: Option<String>,
    region: Option<String>,
    namespace: Option<String>,
    node_id: Option<String>,
    topic: Option<String>,
    metric_domain: Option<String>,
    pubsub_endpoint: Option<String>,
    monitoring_endpoint: Option<String>,
    bigquery_endpoint: Option<String>,
    dataset: Option<String>,
    table: Option<String>,
    anomaly_model: Option<String>,
    anomaly_threshold: Option<f64>,
    anomaly_limit: Option<usize>,
    auth: Option<String>,
    access_token: Option<String>,
    metadata_endpoint: Option<String>,
    request_timeout: Option<String>,
}

fn config_file_path() -> PathBuf {
    if let Ok(path) = env::var("PIPELINE_CONFIG") {
        return PathBuf::from(path);
    }

    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let config_home = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(home).join(".config"));
    config_home.join("metrics-pipeline/config.toml")
}

fn load_file_overrides(path: &Path) -> Result<Option<ConfigOverrides>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| PipelineError::Config(format!("failed reading {}: {e}", path.display())))?;
    let parsed: ConfigOverrides = toml::from_str(&raw)
        .map_err(|e| PipelineError::Config(format!("failed parsing {}: {e}", path.display())))?;
    Ok(Some(parsed))
}

fn load_env_overrides<F>(lookup: F) -> Result<ConfigOverrides>
where
    F: Fn(&str) -> Option<String>,
{
    let port = match lookup("PORT") {
        Some(v) => Some(
            v.parse::<u16>()
                .map_err(|e| PipelineError::Config(format!("bad PORT in environment: {e} (value={v})")))?,
        ),
        None => None,
    };
    let anomaly_threshold = match lookup("PIPELINE_ANOMALY_THRESHOLD") {
        Some(v) => Some(v.parse::<f64>().map_err(|e| {
            PipelineError::Config(format!("bad PIPELINE_ANOMALY_THRESHOLD in environment: {e}"))
        })?),
        None => None,
    };
    let anomaly_limit = match lookup("PIPELINE_ANOMALY_LIMIT") {
        Some(v) => Some(v.parse::<usize>().map_err(|e| {
            PipelineError::Config(format!("bad PIPELINE_ANOMALY_LIMIT in environment: {e}"))
        })?),
        None => None,
    };

    // The emulator speaks plain HTTP and takes no credentials.
    let emulator = lookup("PUBSUB_EMULATOR_HOST").filter(|h| !h.trim().is_empty());
    let pubsub_endpoint = lookup("PIPELINE_PUBSUB_ENDPOINT")
        .or_else(|| emulator.as_ref().map(|host| format!("http://{}", host.trim())));
    let access_token = lookup("PIPELINE_ACCESS_TOKEN");
    let auth = lookup("PIPELINE_AUTH")
        .or_else(|| access_token.as_ref().map(|_| "token".to_string()))
        .or_else(|| emulator.as_ref().map(|_| "none".to_string()));

    Ok(ConfigOverrides {
        port,
        bind_host: lookup("PIPELINE_BIND_HOST"),
        project_id: lookup("PIPELINE_PROJECT_ID").or_else(|| lookup("GOOGLE_CLOUD_PROJECT")),
        region: lookup("PIPELINE_REGION"),
        namespace: lookup("PIPELINE_NAMESPACE"),
        node_id: lookup("PIPELINE_NODE_ID"),
        topic: lookup("PIPELINE_TOPIC"),
        metric_domain: lookup("PIPELINE_METRIC_DOMAIN"),
        pubsub_endpoint,
        monitoring_endpoint: lookup("PIPELINE_MONITORING_ENDPOINT"),
        bigquery_endpoint: lookup("PIPELINE_BIGQUERY_ENDPOINT"),
        dataset: lookup("PIPELINE_DATASET"),
        table: lookup("PIPELINE_TABLE"),
        anomaly_model: lookup("PIPELINE_ANOMALY_MODEL"),
        anomaly_threshold,
        anomaly_limit,
        auth,
        access_token,
        metadata_endpoint: lookup("GCE_METADATA_HOST").map(|host| format!("http://{}", host.trim())),
        request_timeout: lookup("PIPELINE_REQUEST_TIMEOUT"),
    })
}

fn apply_overrides(cfg: &mut Config, overrides: ConfigOverrides, source: &str) -> Result<()> {
    if let Some(v) = overrides.port {
        cfg.port = v;
    }
    if let Some(v) = overrides.bind_host {
        cfg.bind_host = v;
    }
    if let Some(v) = overrides.project_id {
        cfg.project_id = v;
    }
    if let Some(v) = overrides.region {
        cfg.region = v;
    }
    if let Some(v) = overrides.namespace {
        cfg.namespace = v;
    }
    if let Some(v) = overrides.node_id {
        cfg.node_id = v;
    }
    if let Some(v) = overrides.topic {
        cfg.topic = v;
    }
    if let Some(v) = overrides.metric_domain {
        cfg.metric_domain = v;
    }
    if let Some(v) = overrides.pubsub_endpoint {
        cfg.pubsub_endpoint = v;
    }
    if let Some(v) = overrides.monitoring_endpoint {
        cfg.monitoring_endpoint = v;
    }
    if let Some(v) = overrides.bigquery_endpoint {
        cfg.bigquery_endpoint = v;
    }
    if let Some(v) = overrides.dataset {
        cfg.dataset = v;
    }
    if let Some(v) = overrides.table {
        cfg.table = v;
    }
    if let Some(v) = overrides.anomaly_model {
        cfg.anomaly_model = v;
    }
    if let Some(v) = overrides.anomaly_threshold {
        cfg.anomaly_threshold = v;
    }
    if let Some(v) = overrides.anomaly_limit {
        cfg.anomaly_limit = v;
    }
    if let Some(v) = overrides.auth {
        cfg.auth = v;
    }
    if let Some(v) = overrides.access_token {
        cfg.access_token = Some(v);
    }
    if let Some(v) = overrides.metadata_endpoint {
        cfg.metadata_endpoint = v;
    }
    if let Some(v) = overrides.request_timeout {
        cfg.request_timeout = humantime::parse_duration(&v).map_err(|e| {
            PipelineError::Config(format!("bad request_timeout in {source}: {e} (value={v})"))
        })?;
    }
    Ok(())
}
