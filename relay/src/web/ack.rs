//! Acknowledgment body that releases the forward once the response is sent.
//!
//! The server drops a response body only after it has emitted every frame,
//! so spawning from `Drop` puts the forward strictly after the `200 OK`
//! leaves the service. A body dropped early (client gone) still forwards:
//! the webhook was already acknowledged.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::runtime::Handle;
use tracing::error;

use crate::notify::{spawn_forward, Notifier, OutboundNotification};

struct PendingForward {
    notifier: Arc<dyn Notifier>,
    notification: OutboundNotification,
}

/// Fixed response body carrying a not-yet-started forward.
pub struct AckBody {
    data: Option<Bytes>,
    forward: Option<PendingForward>,
}

impl AckBody {
    pub fn new(
        data: impl Into<Bytes>,
        notifier: Arc<dyn Notifier>,
        notification: OutboundNotification,
    ) -> Self {
        Self {
            data: Some(data.into()),
            forward: Some(PendingForward {
                notifier,
                notification,
            }),
        }
    }
}

impl Body for AckBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Poll::Ready(self.data.take().map(|data| Ok(Frame::data(data))))
    }

    fn is_end_stream(&self) -> bool {
        self.data.is_none()
    }

    fn size_hint(&self) -> SizeHint {
        let len = self.data.as_ref().map(|d| d.len() as u64).unwrap_or(0);
        SizeHint::with_exact(len)
    }
}

impl Drop for AckBody {
    fn drop(&mut self) {
        let Some(pending) = self.forward.take() else {
            return;
        };

        if Handle::try_current().is_err() {
            error!(
                title = %pending.notification.title,
                "notification_forward_no_runtime"
            );
            return;
        }

        spawn_forward(pending.notifier, pending.notification);
    }
}
