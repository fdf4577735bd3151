//! Fire-and-forget reporting webhook.
//!
//! Success/failure reports for finished orders go to a configurable
//! webhook (the platform's notification service). Delivery is best effort:
//! a failed POST is logged and dropped, never retried, and never blocks
//! the worker.

use serde::Serialize;
use tracing::{debug, warn};

use inkpost_queue::RenderOrder;

/// Notification payload.
#[derive(Debug, Serialize)]
struct Notification<'a> {
    event: &'static str,
    generation_id: &'a str,
    post_id: &'a str,
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    video_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    publish_platforms: Vec<String>,
}

/// Webhook notifier.
pub struct Notifier {
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    /// Create from environment variables. With no `NOTIFY_WEBHOOK_URL` set
    /// the notifier is a no-op.
    pub fn from_env() -> Self {
        Self {
            http: reqwest::Client::new(),
            webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
        }
    }

    /// Report a completed render. Platforms are included when the request
    /// asked for auto-publish so the notification service can fan out.
    pub async fn completed(&self, order: &RenderOrder, video_url: &str) {
        let platforms = if order.auto_publish {
            order
                .publish_platforms
                .iter()
                .map(|p| p.to_string())
                .collect()
        } else {
            Vec::new()
        };

        self.send(Notification {
            event: "generation_completed",
            generation_id: order.generation_id.as_str(),
            post_id: &order.post_id,
            user_id: &order.user_id,
            video_url: Some(video_url),
            error: None,
            publish_platforms: platforms,
        })
        .await;
    }

    /// Report a failed render.
    pub async fn failed(&self, order: &RenderOrder, error: &str) {
        self.send(Notification {
            event: "generation_failed",
            generation_id: order.generation_id.as_str(),
            post_id: &order.post_id,
            user_id: &order.user_id,
            video_url: None,
            error: Some(error),
            publish_platforms: Vec::new(),
        })
        .await;
    }

    async fn send(&self, notification: Notification<'_>) {
        let Some(url) = &self.webhook_url else {
            debug!("No webhook configured, dropping notification");
            return;
        };

        match self.http.post(url).json(&notification).send().await {
            Ok(response) if !response.status().is_success() => {
                warn!(
                    status = %response.status(),
                    event = notification.event,
                    "Notification webhook rejected"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(event = notification.event, "Notification webhook failed: {}", e);
            }
        }
    }
}
