use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use pipeline_core::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

use crate::{Publisher, TokenSource, authorize, describe_failure};

/// Pub/Sub `topics.publish` over REST.
#[derive(Clone)]
pub struct PubSubClient {
    http: reqwest::Client,
    tokens: TokenSource,
    endpoint: String,
    project_id: String,
}

#[derive(Debug, Serialize)]
struct PublishRequest {
    messages: Vec<PubsubMessage>,
}

#[derive(Debug, Serialize)]
struct PubsubMessage {
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

impl PubSubClient {
    pub fn new(http: reqwest::Client, tokens: TokenSource, endpoint: &str, project_id: &str) -> Self {
        Self {
            http,
            tokens,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
        }
    }

    pub fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{topic}", self.project_id)
    }
}

#[async_trait]
impl Publisher for PubSubClient {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<String> {
        let url = format!("{}/v1/{}:publish", self.endpoint, self.topic_path(topic));
        let body = PublishRequest {
            messages: vec![PubsubMessage {
                data: STANDARD.encode(&payload),
            }],
        };

        let req = authorize(self.http.post(&url).json(&body), &self.tokens).await?;
        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::Publish(format!("publish to {topic} failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Publish(format!(
                "publish to {topic} rejected: {}",
                describe_failure(resp).await
            )));
        }

        let parsed: PublishResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Publish(format!("bad publish response: {e}")))?;
        parsed
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::Publish("publish response carried no message id".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use testkit::FakeGoogleApi;

    use super::*;

    #[tokio::test]
    async fn publish_sends_base64_data_without_attributes() {
        let api = FakeGoogleApi::start().await;
        let client = PubSubClient::new(
            reqwest::Client::new(),
            TokenSource::Static("tok".into()),
            &api.base_url(),
            "demo",
        );

        let id = client
            .publish("metrics-topic", Bytes::from_static(br#"{"cpu":42}"#))
            .await
            .unwrap();
        assert_eq!(id, "1");

        let requests = api.requests_to("/v1/projects/demo/topics/metrics-topic:publish");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("authorization").as_deref(), Some("Bearer tok"));

        let body = requests[0].json();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].get("attributes").is_none());
        let data = STANDARD.decode(messages[0]["data"].as_str().unwrap()).unwrap();
        assert_eq!(data, br#"{"cpu":42}"#);
    }

    #[tokio::test]
    async fn publish_rejection_is_a_publish_error() {
        let api = FakeGoogleApi::start().await;
        api.fail_path("/v1/projects/demo/topics/missing:publish", 404);
        let client = PubSubClient::new(
            reqwest::Client::new(),
            TokenSource::None,
            &api.base_url(),
            "demo",
        );

        let err = client
            .publish("missing", Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Publish(_)));
        assert!(err.to_string().contains("404"));
    }
}
