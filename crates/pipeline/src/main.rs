mod telemetry;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pipeline_cloud::CloudClients;
use pipeline_core::config::Config;
use pipeline_core::time::parse_duration_str;
use pipeline_ingest::server::{Service, build_router, serve};

use crate::telemetry::{LogFormat, init_tracing, shutdown_tracing};

#[derive(Parser, Debug)]
#[command(name = "metrics-pipeline")]
#[command(about = "Metrics ingest API backed by Pub/Sub, Cloud Monitoring and BigQuery")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(long, global = true, help = "Listening port (overrides PORT)")]
    port: Option<u16>,

    #[arg(long, global = true)]
    project_id: Option<String>,

    #[arg(long, global = true)]
    topic: Option<String>,

    #[arg(long, global = true, help = "Outbound request timeout, e.g. 5s")]
    request_timeout: Option<String>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Commands {
    #[command(about = "Accept POST /metrics and publish payloads (default)")]
    Serve,
    #[command(about = "Receive Pub/Sub push deliveries and store rows in BigQuery")]
    Process,
    #[command(about = "Serve GET /get_anomalies from the BigQuery ML model")]
    Anomalies,
}

impl Commands {
    fn service(self) -> Service {
        match self {
            Self::Serve => Service::Ingest,
            Self::Process => Service::Processor,
            Self::Anomalies => Service::Anomalies,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(LogFormat::from_env());

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut cfg = Config::load().context("load config")?;
    if let Some(v) = cli.port {
        cfg.port = v;
    }
    if let Some(v) = cli.project_id {
        cfg.project_id = v;
    }
    if let Some(v) = cli.topic {
        cfg.topic = v;
    }
    if let Some(v) = cli.request_timeout {
        cfg.request_timeout = parse_duration_str(&v)?;
    }
    cfg.validate()?;

    let service = cli.command.unwrap_or(Commands::Serve).service();
    let clients = CloudClients::from_config(&cfg).context("build cloud clients")?;
    let router = build_router(service, &cfg, &clients);

    tracing::info!(
        service = service.name(),
        project_id = %cfg.project_id,
        topic = %cfg.topic,
        "starting metrics pipeline"
    );
    serve(router, &cfg.listen_addr(), shutdown_signal()).await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = ?e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = ?e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
