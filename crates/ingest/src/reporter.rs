use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use pipeline_cloud::MetricWriter;
use pipeline_core::config::Config;
use pipeline_core::model::series::{
    MetricKind, ResourceDescriptor, TimeSeriesPoint, custom_metric_type,
};
use pipeline_core::time::truncate_to_seconds;

/// Counts outcomes of metric writes. Failures never reach the HTTP caller,
/// so this is the only place they add up.
#[derive(Debug, Default)]
pub struct ReporterStats {
    recorded: AtomicU64,
    failed: AtomicU64,
}

impl ReporterStats {
    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[derive(Clone)]
pub struct MetricReporter {
    writer: Arc<dyn MetricWriter>,
    resource: ResourceDescriptor,
    metric_domain: String,
    stats: Arc<ReporterStats>,
}

impl MetricReporter {
    pub fn new(writer: Arc<dyn MetricWriter>, cfg: &Config) -> Self {
        Self {
            writer,
            resource: ResourceDescriptor::generic_node(cfg),
            metric_domain: cfg.metric_domain.clone(),
            stats: Arc::new(ReporterStats::default()),
        }
    }

    pub fn stats(&self) -> &ReporterStats {
        &self.stats
    }

    pub fn point(&self, name: &str, value: f64) -> TimeSeriesPoint {
        TimeSeriesPoint {
            metric_type: custom_metric_type(&self.metric_domain, name),
            resource: self.resource.clone(),
            end_time: truncate_to_seconds(Utc::now()),
            value,
        }
    }

    /// Writes one point. Errors are logged and counted, never returned.
    pub async fn record(&self, name: &str, value: f64) {
        let point = self.point(name, value);
        match self.writer.write_point(&point).await {
            Ok(()) => {
                self.stats.recorded.fetch_add(1, Ordering::Relaxed);
                tracing::info!(metric_type = %point.metric_type, value, "recorded metric");
            }
            Err(e) => {
                let failed = self.stats.failed.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::error!(
                    metric_type = %point.metric_type,
                    value,
                    failed_total = failed,
                    error = %e,
                    "error recording metric"
                );
            }
        }
    }

    pub async fn record_ingestion(&self) {
        self.record(MetricKind::IngestionRate.name(), 1.0).await;
    }

    pub async fn record_latency(&self, elapsed_ms: f64) {
        self.record(MetricKind::Latency.name(), elapsed_ms).await;
    }
}
