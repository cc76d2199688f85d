//! Notification forwarding.
//!
//! Verified payloads are turned into an [`OutboundNotification`] and handed
//! to a [`Notifier`] on a detached task:
//!
//! ```text
//! payload → OutboundNotification::from_payload() → spawn_forward() → Notifier::notify()
//! ```
//!
//! Forwarding is best-effort. The webhook caller has already been answered
//! by the time a notification is sent, so failures only show up in the logs.

pub mod discord;
pub mod message;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use discord::DiscordNotifier;
pub use message::{
    NotificationField, OutboundNotification, DATA_FIELD, MAX_FIELD_CHARS, TRUNCATION_MARKER,
};

/// Result of a forward that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The endpoint accepted the notification.
    Delivered,
    /// No endpoint is configured; nothing was sent.
    Disabled,
}

/// Why a notification could not be delivered.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("notification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification request timed out after {0:?}")]
    Timeout(Duration),

    #[error("notification endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Outbound notification capability.
pub trait Notifier: Send + Sync + 'static {
    fn notify<'a>(
        &'a self,
        notification: &'a OutboundNotification,
    ) -> BoxFuture<'a, Result<ForwardOutcome, ForwardError>>;
}

/// Forward `notification` on a detached task.
///
/// The returned handle may be dropped; the task runs to completion on its own
/// and reports its outcome through the logger only.
pub fn spawn_forward(
    notifier: Arc<dyn Notifier>,
    notification: OutboundNotification,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.notify(&notification).await {
            Ok(ForwardOutcome::Delivered) => {
                info!(title = %notification.title, "notification_forwarded");
            }
            Ok(ForwardOutcome::Disabled) => {
                info!("notification_forward_disabled");
            }
            Err(e) => {
                error!(error = %e, "notification_forward_failed");
            }
        }
    })
}
