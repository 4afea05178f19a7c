use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pipeline_cloud::{MetricWriter, Publisher, Warehouse};
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::model::row::{AnomalyQuery, AnomalyRow, MetricRow};
use pipeline_core::model::series::TimeSeriesPoint;

#[derive(Default)]
pub struct RecordingPublisher {
    fail: bool,
    delay: Option<Duration>,
    published: Mutex<Vec<(String, Bytes)>>,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Holds every publish for `delay` before acknowledging it.
    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut published = self.published.lock().unwrap();
        published.push((topic.to_string(), payload));
        if self.fail {
            return Err(PipelineError::Publish("topic unavailable".to_string()));
        }
        Ok(published.len().to_string())
    }
}

#[derive(Default)]
pub struct RecordingMetricWriter {
    fail: bool,
    points: Mutex<Vec<TimeSeriesPoint>>,
}

impl RecordingMetricWriter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn points(&self) -> Vec<TimeSeriesPoint> {
        self.points.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricWriter for RecordingMetricWriter {
    async fn write_point(&self, point: &TimeSeriesPoint) -> Result<()> {
        self.points.lock().unwrap().push(point.clone());
        if self.fail {
            return Err(PipelineError::Monitoring("permission denied".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryWarehouse {
    fail: bool,
    rows: Mutex<Vec<MetricRow>>,
    anomalies: Vec<AnomalyRow>,
    queries: Mutex<Vec<AnomalyQuery>>,
}

impl MemoryWarehouse {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_anomalies(anomalies: Vec<AnomalyRow>) -> Self {
        Self {
            anomalies,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> Vec<MetricRow> {
        self.rows.lock().unwrap().clone()
    }

    pub fn queries(&self) -> Vec<AnomalyQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn insert_rows(&self, rows: &[MetricRow]) -> Result<()> {
        if self.fail {
            return Err(PipelineError::Warehouse("insert errors: [row 0 invalid]".to_string()));
        }
        self.rows.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    async fn detect_anomalies(&self, query: &AnomalyQuery) -> Result<Vec<AnomalyRow>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail {
            return Err(PipelineError::Warehouse("model not found".to_string()));
        }
        Ok(self.anomalies.clone())
    }
}
