use std::sync::Arc;
use std::time::{Duration, Instant};

use pipeline_core::config::Config;
use pipeline_core::error::{PipelineError, Result};
use serde::Deserialize;
use tokio::sync::Mutex;

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    None,
    Token,
    Metadata,
}

impl AuthMode {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "none" | "off" | "emulator" => Self::None,
            "token" | "static" => Self::Token,
            _ => Self::Metadata,
        }
    }
}

/// Supplies OAuth bearer tokens for outbound Google API calls.
#[derive(Clone)]
pub enum TokenSource {
    None,
    Static(String),
    Metadata(MetadataTokens),
}

impl TokenSource {
    pub fn from_config(cfg: &Config, http: reqwest::Client) -> Result<Self> {
        match AuthMode::parse(&cfg.auth) {
            AuthMode::None => Ok(Self::None),
            AuthMode::Token => cfg
                .access_token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .map(Self::Static)
                .ok_or_else(|| {
                    PipelineError::Config(
                        "auth=token requires access_token (PIPELINE_ACCESS_TOKEN)".to_string(),
                    )
                }),
            AuthMode::Metadata => Ok(Self::Metadata(MetadataTokens::new(
                http,
                &cfg.metadata_endpoint,
            ))),
        }
    }

    pub async fn token(&self) -> Result<Option<String>> {
        match self {
            Self::None => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::Metadata(source) => source.token().await.map(Some),
        }
    }
}

/// Tokens from the instance metadata server, cached until shortly before they expire.
#[derive(Clone)]
pub struct MetadataTokens {
    http: reqwest::Client,
    url: String,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

impl MetadataTokens {
    pub fn new(http: reqwest::Client, endpoint: &str) -> Self {
        Self {
            http,
            url: format!("{}{TOKEN_PATH}", endpoint.trim_end_matches('/')),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn token(&self) -> Result<String> {
        let mut slot = self.cached.lock().await;
        if let Some(cached) = slot.as_ref()
            && Instant::now() < cached.refresh_at
        {
            return Ok(cached.value.clone());
        }

        let fetched = self.fetch().await?;
        let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(REFRESH_MARGIN);
        tracing::debug!(expires_in = fetched.expires_in, "refreshed metadata access token");
        *slot = Some(CachedToken {
            value: fetched.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fetched.access_token)
    }

    async fn fetch(&self) -> Result<MetadataTokenResponse> {
        let resp = self
            .http
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| PipelineError::Auth(format!("metadata token request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Auth(format!(
                "metadata token request rejected: {}",
                crate::describe_failure(resp).await
            )));
        }
        resp.json()
            .await
            .map_err(|e| PipelineError::Auth(format!("bad metadata token response: {e}")))
    }
}
