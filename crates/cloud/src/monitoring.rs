use std::collections::BTreeMap;

use async_trait::async_trait;
use pipeline_core::error::{PipelineError, Result};
use pipeline_core::model::series::TimeSeriesPoint;
use pipeline_core::time::rfc3339_seconds;
use serde::Serialize;

use crate::{MetricWriter, TokenSource, authorize, describe_failure};

/// Cloud Monitoring `timeSeries.create` over REST, one point per call.
#[derive(Clone)]
pub struct MonitoringClient {
    http: reqwest::Client,
    tokens: TokenSource,
    endpoint: String,
    project_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTimeSeriesRequest<'a> {
    time_series: Vec<TimeSeries<'a>>,
}

#[derive(Debug, Serialize)]
struct TimeSeries<'a> {
    metric: MetricDescriptor<'a>,
    resource: MonitoredResource<'a>,
    points: Vec<Point>,
}

#[derive(Debug, Serialize)]
struct MetricDescriptor<'a> {
    #[serde(rename = "type")]
    metric_type: &'a str,
}

#[derive(Debug, Serialize)]
struct MonitoredResource<'a> {
    #[serde(rename = "type")]
    resource_type: &'a str,
    labels: BTreeMap<&'static str, &'a str>,
}

#[derive(Debug, Serialize)]
struct Point {
    interval: Interval,
    value: TypedValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Interval {
    end_time: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TypedValue {
    double_value: f64,
}

impl MonitoringClient {
    pub fn new(http: reqwest::Client, tokens: TokenSource, endpoint: &str, project_id: &str) -> Self {
        Self {
            http,
            tokens,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        }
    }
}

fn build_request(point: &TimeSeriesPoint) -> CreateTimeSeriesRequest<'_> {
    CreateTimeSeriesRequest {
        time_series: vec![TimeSeries {
            metric: MetricDescriptor {
                metric_type: &point.metric_type,
            },
            resource: MonitoredResource {
                resource_type: &point.resource.resource_type,
                labels: point.resource.labels().into_iter().collect(),
            },
            points: vec![Point {
                interval: Interval {
                    end_time: rfc3339_seconds(point.end_time),
                },
                value: TypedValue {
                    double_value: point.value,
                },
            }],
        }],
    }
}

#[async_trait]
impl MetricWriter for MonitoringClient {
    async fn write_point(&self, point: &TimeSeriesPoint) -> Result<()> {
        let url = format!("{}/v3/projects/{}/timeSeries", self.endpoint, self.project_id);
        let body = build_request(point);

        let req = authorize(self.http.post(&url).json(&body), &self.tokens).await?;
        let resp = req.send().await.map_err(|e| {
            PipelineError::Monitoring(format!("write {} failed: {e}", point.metric_type))
        })?;
        if !resp.status().is_success() {
            return Err(PipelineError::Monitoring(format!(
                "write {} rejected: {}",
                point.metric_type,
                describe_failure(resp).await
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pipeline_core::model::series::ResourceDescriptor;
    use serde_json::json;
    use testkit::FakeGoogleApi;

    use super::*;

    fn sample_point() -> TimeSeriesPoint {
        TimeSeriesPoint {
            metric_type: "custom.googleapis.com/metrics_pipeline/latency".into(),
            resource: ResourceDescriptor {
                resource_type: "generic_node".into(),
                project_id: "demo".into(),
                location: "us-central1".into(),
                namespace: "default".into(),
                node_id: "metrics-api-node".into(),
            },
            end_time: Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap(),
            value: 12.5,
        }
    }

    #[test]
    fn request_matches_time_series_wire_shape() {
        let point = sample_point();
        let body = serde_json::to_value(build_request(&point)).unwrap();
        assert_eq!(
            body,
            json!({
                "timeSeries": [{
                    "metric": {"type": "custom.googleapis.com/metrics_pipeline/latency"},
                    "resource": {
                        "type": "generic_node",
                        "labels": {
                            "location": "us-central1",
                            "namespace": "default",
                            "node_id": "metrics-api-node",
                            "project_id": "demo"
                        }
                    },
                    "points": [{
                        "interval": {"endTime": "2026-02-01T00:00:00Z"},
                        "value": {"doubleValue": 12.5}
                    }]
                }]
            })
        );
    }

    #[tokio::test]
    async fn write_point_posts_to_project_time_series() {
        let api = FakeGoogleApi::start().await;
        let client = MonitoringClient::new(
            reqwest::Client::new(),
            TokenSource::None,
            &api.base_url(),
            "demo",
        );

        client.write_point(&sample_point()).await.unwrap();

        let requests = api.requests_to("/v3/projects/demo/timeSeries");
        assert_eq!(requests.len(), 1);
        assert!(requests[0].header("authorization").is_none());
        assert_eq!(
            requests[0].json()["timeSeries"][0]["points"][0]["value"]["doubleValue"],
            json!(12.5)
        );
    }

    #[tokio::test]
    async fn rejected_write_is_a_monitoring_error() {
        let api = FakeGoogleApi::start().await;
        api.fail_path("/v3/projects/demo/timeSeries", 400);
        let client = MonitoringClient::new(
            reqwest::Client::new(),
            TokenSource::None,
            &api.base_url(),
            "demo",
        );

        let err = client.write_point(&sample_point()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Monitoring(_)));
    }
}
