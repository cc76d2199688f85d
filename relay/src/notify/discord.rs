//! Discord webhook delivery.
//!
//! Notifications are posted as a single embed. One attempt per notification;
//! failures are returned to the caller, never retried and never logged here
//! ([`super::spawn_forward`] logs the outcome).

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::Client;
use serde::Serialize;

use super::{ForwardError, ForwardOutcome, Notifier, OutboundNotification};

const USERNAME: &str = "U7BUY Relay";

/// Embed accent color (U7BUY orange).
const EMBED_COLOR: u32 = 0xF5_8A_07;

/// Request body understood by Discord's execute-webhook endpoint.
#[derive(Debug, Serialize)]
pub struct DiscordPayload<'a> {
    pub username: &'a str,
    pub embeds: [DiscordEmbed<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct DiscordEmbed<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub color: u32,
    pub fields: Vec<DiscordField<'a>>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct DiscordField<'a> {
    pub name: &'a str,
    pub value: &'a str,
    pub inline: bool,
}

impl<'a> DiscordPayload<'a> {
    pub fn from_notification(notification: &'a OutboundNotification) -> Self {
        let fields = notification
            .fields
            .iter()
            .map(|f| DiscordField {
                name: &f.name,
                value: &f.value,
                inline: f.name != super::DATA_FIELD,
            })
            .collect();

        Self {
            username: USERNAME,
            embeds: [DiscordEmbed {
                title: &notification.title,
                description: &notification.description,
                color: EMBED_COLOR,
                fields,
                timestamp: notification.timestamp.to_rfc3339(),
            }],
        }
    }
}

/// Posts notifications to a Discord webhook URL.
///
/// Without a URL every call is a no-op returning [`ForwardOutcome::Disabled`].
#[derive(Clone)]
pub struct DiscordNotifier {
    client: Client,
    webhook_url: Option<String>,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(client: Client, webhook_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            webhook_url: webhook_url.filter(|u| !u.trim().is_empty()),
            timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn post(&self, notification: &OutboundNotification) -> Result<ForwardOutcome, ForwardError> {
        let Some(url) = self.webhook_url.as_deref() else {
            return Ok(ForwardOutcome::Disabled);
        };

        let body = DiscordPayload::from_notification(notification);

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ForwardError::Timeout(self.timeout)
                } else {
                    ForwardError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(200).collect();
            return Err(ForwardError::Status {
                status: status.as_u16(),
                body: detail,
            });
        }

        Ok(ForwardOutcome::Delivered)
    }
}

impl Notifier for DiscordNotifier {
    fn notify<'a>(
        &'a self,
        notification: &'a OutboundNotification,
    ) -> BoxFuture<'a, Result<ForwardOutcome, ForwardError>> {
        self.post(notification).boxed()
    }
}
