//! HTTP client for the external render service.
//!
//! The renderer is a black box: it takes a post and a target format and
//! returns a hosted video URL plus duration. Everything else (models,
//! GPUs, storage) is its problem.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use inkpost_models::{GenerationId, VideoKind};

use crate::error::{WorkerError, WorkerResult};

/// Renderer client configuration.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Base URL of the render service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl RendererConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("RENDERER_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            timeout: Duration::from_secs(
                std::env::var("RENDERER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

/// Request sent to the render service.
#[derive(Debug, Serialize)]
pub struct RenderRequest {
    pub generation_id: GenerationId,
    pub post_id: String,
    pub video_kind: VideoKind,
}

/// Output returned by the render service.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderOutput {
    pub video_url: String,
    pub duration_seconds: u32,
}

/// Render service client.
pub struct RendererClient {
    http: reqwest::Client,
    base_url: String,
}

impl RendererClient {
    /// Create a new client.
    pub fn new(config: RendererConfig) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> WorkerResult<Self> {
        Self::new(RendererConfig::from_env())
    }

    /// Render one video. Blocks until the service answers or the client
    /// timeout fires.
    pub async fn render(&self, request: &RenderRequest) -> WorkerResult<RenderOutput> {
        let url = format!("{}/render", self.base_url);
        info!(
            generation_id = %request.generation_id,
            kind = %request.video_kind,
            "Dispatching render to {}",
            url
        );

        let response = self.http.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::renderer(format!(
                "render service returned {}: {}",
                status, body
            )));
        }

        let output: RenderOutput = response.json().await?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> RenderRequest {
        RenderRequest {
            generation_id: GenerationId::from("gen-1"),
            post_id: "post-1".to_string(),
            video_kind: VideoKind::Short,
        }
    }

    #[tokio::test]
    async fn test_render_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "video_url": "https://cdn.example.com/v/gen-1.mp4",
                "duration_seconds": 37
            })))
            .mount(&server)
            .await;

        let client = RendererClient::new(RendererConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let output = client.render(&request()).await.unwrap();
        assert_eq!(output.video_url, "https://cdn.example.com/v/gen-1.mp4");
        assert_eq!(output.duration_seconds, 37);
    }

    #[tokio::test]
    async fn test_render_service_error_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/render"))
            .respond_with(ResponseTemplate::new(503).set_body_string("gpu pool exhausted"))
            .mount(&server)
            .await;

        let client = RendererClient::new(RendererConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap();

        let err = client.render(&request()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("gpu pool exhausted"));
    }
}
