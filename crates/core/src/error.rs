use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("monitoring error: {0}")]
    Monitoring(String),

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("ingest error: {0}")]
    Ingest(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
