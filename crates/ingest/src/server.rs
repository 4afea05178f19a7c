use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use pipeline_cloud::CloudClients;
use pipeline_core::config::Config;
use pipeline_core::error::{PipelineError, Result};

use crate::anomalies::{self, AnomalyState};
use crate::http::{self, IngestState};
use crate::push::{self, PushState};
use crate::reporter::MetricReporter;

/// Which HTTP surface a process exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Ingest,
    Processor,
    Anomalies,
}

impl Service {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Processor => "processor",
            Self::Anomalies => "anomalies",
        }
    }
}

pub fn build_router(service: Service, cfg: &Config, clients: &CloudClients) -> Router {
    match service {
        Service::Ingest => http::router(IngestState {
            publisher: clients.publisher.clone(),
            reporter: MetricReporter::new(clients.metrics.clone(), cfg),
            topic: Arc::from(cfg.topic.as_str()),
        }),
        Service::Processor => push::router(PushState {
            warehouse: clients.warehouse.clone(),
        }),
        Service::Anomalies => {
            anomalies::router(AnomalyState::new(clients.warehouse.clone(), cfg))
        }
    }
}

/// Binds `addr` and serves `router` until `shutdown` resolves.
pub async fn serve<F>(router: Router, addr: &str, shutdown: F) -> Result<SocketAddr>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PipelineError::Io(format!("failed to bind {addr}: {e}")))?;
    let local = listener
        .local_addr()
        .map_err(|e| PipelineError::Io(format!("failed to read bound address: {e}")))?;
    tracing::info!(addr = %local, "server running on port {}", local.port());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PipelineError::Ingest(format!("HTTP server failed: {e}")))?;
    Ok(local)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::fakes::{MemoryWarehouse, RecordingMetricWriter, RecordingPublisher};

    fn clients() -> (CloudClients, Arc<RecordingPublisher>) {
        let publisher = Arc::new(RecordingPublisher::default());
        let clients = CloudClients {
            publisher: publisher.clone(),
            metrics: Arc::new(RecordingMetricWriter::default()),
            warehouse: Arc::new(MemoryWarehouse::default()),
        };
        (clients, publisher)
    }

    #[test]
    fn service_names() {
        assert_eq!(Service::Ingest.name(), "ingest");
        assert_eq!(Service::Processor.name(), "processor");
        assert_eq!(Service::Anomalies.name(), "anomalies");
    }

    #[tokio::test]
    async fn serves_ingest_router_until_shutdown() {
        let cfg = Config {
            project_id: "demo".into(),
            ..Config::default()
        };
        let (clients, publisher) = clients();
        let router = build_router(Service::Ingest, &cfg, &clients);

        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            serve(router, &addr.to_string(), async {
                let _ = rx.await;
            })
            .await
        });

        let mut stream = None;
        for _ in 0..50 {
            if let Ok(s) = tokio::net::TcpStream::connect(addr).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let mut stream = stream.expect("server did not start");

        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let body = r#"{"cpu":1}"#;
        let request = format!(
            "POST /metrics HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("Metrics received and sent to Pub/Sub."));
        assert_eq!(publisher.published().len(), 1);

        tx.send(()).unwrap();
        let bound = server.await.unwrap().unwrap();
        assert_eq!(bound, addr);
    }

    #[tokio::test]
    async fn bind_failure_is_io_error() {
        let (clients, _) = clients();
        let router = build_router(Service::Processor, &Config::default(), &clients);
        let err = serve(router, "not-an-address", async {}).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
