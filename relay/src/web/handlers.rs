//! Webhook endpoint handlers.
//!
//! The webhook handler only:
//! 1. Verifies the signature over the raw body
//! 2. Parses the payload and answers the caller
//! 3. Hands the formatted notification to a detached forwarding task once
//!    the `200 OK` body has been sent (see [`AckBody`])
//!
//! The caller never waits on Discord.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::notify::{Notifier, OutboundNotification};
use crate::web::ack::AckBody;
use crate::web::signature::{verify, VerificationResult};
use crate::Config;

/// Body sent with every accepted webhook.
pub const ACK_BODY: &str = "OK";

/// Body sent when the signature check fails.
pub const INVALID_SIGNATURE_BODY: &str = "Invalid signature";

/// Body sent when the request fails before it could be acknowledged.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config: Arc::new(config),
            notifier,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// U7BUY Webhook
// =============================================================================

/// U7BUY webhook endpoint.
///
/// Responds `200 OK` once the request is verified (or verification is
/// disabled), `401` on a bad signature and `500` when the body is not JSON.
/// Forwarding starts only after the response body has been emitted and
/// cannot change the response.
pub async fn u7buy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(state.config.signature_header.as_str())
        .map(|v| v.as_bytes());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "u7buy_webhook_received"
    );

    let verification = verify(&body, signature, state.config.u7buy_secret.as_deref());
    if !verification.is_authorized() {
        warn!(
            header = %state.config.signature_header,
            body_length = body.len(),
            "u7buy_signature_invalid"
        );
        return (StatusCode::UNAUTHORIZED, INVALID_SIGNATURE_BODY).into_response();
    }

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, body_length = body.len(), "u7buy_payload_parse_failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY).into_response();
        }
    };

    info!(
        verified = verification == VerificationResult::Valid,
        payload = %payload,
        "u7buy_payload_accepted"
    );

    let notification = OutboundNotification::from_payload(&payload, Utc::now());
    let ack = AckBody::new(ACK_BODY, Arc::clone(&state.notifier), notification);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::new(ack),
    )
        .into_response()
}

/// Parse the raw body; an empty body is an empty object.
fn parse_payload(body: &[u8]) -> Result<Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::Request,
        middleware::map_response,
        Router,
    };
    use futures::future::{self, BoxFuture, FutureExt};
    use reqwest::Client;
    use tokio::sync::mpsc;
    use tower::ServiceExt;
    use tracing_subscriber::fmt::MakeWriter;

    use crate::notify::{DiscordNotifier, ForwardError, ForwardOutcome};
    use crate::web::router;
    use crate::web::signature::compute_signature;

    const SECRET: &str = "shared-secret";
    const BODY: &str = r#"{"event":"order.paid","order_id":"A-1001"}"#;

    /// Reports every notification it is asked to send.
    struct RecordingNotifier {
        tx: mpsc::UnboundedSender<OutboundNotification>,
    }

    impl Notifier for RecordingNotifier {
        fn notify<'a>(
            &'a self,
            notification: &'a OutboundNotification,
        ) -> BoxFuture<'a, Result<ForwardOutcome, ForwardError>> {
            let _ = self.tx.send(notification.clone());
            async { Ok(ForwardOutcome::Delivered) }.boxed()
        }
    }

    /// Never finishes.
    struct HangingNotifier;

    impl Notifier for HangingNotifier {
        fn notify<'a>(
            &'a self,
            _notification: &'a OutboundNotification,
        ) -> BoxFuture<'a, Result<ForwardOutcome, ForwardError>> {
            future::pending().boxed()
        }
    }

    fn config(secret: Option<&str>) -> Config {
        let mut vars = HashMap::new();
        vars.insert("LOG_FILE", String::new());
        if let Some(secret) = secret {
            vars.insert("U7BUY_SECRET", secret.to_string());
        }
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    fn recording_app(
        secret: Option<&str>,
    ) -> (Router, mpsc::UnboundedReceiver<OutboundNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = AppState::new(config(secret), Arc::new(RecordingNotifier { tx }));
        (router(state), rx)
    }

    fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("x-u7buy-signature", sig);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn assert_no_forward(rx: &mut mpsc::UnboundedReceiver<OutboundNotification>) {
        let next = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(
            !matches!(next, Ok(Some(_))),
            "no notification should have been forwarded"
        );
    }

    async fn expect_forward(
        rx: &mut mpsc::UnboundedReceiver<OutboundNotification>,
    ) -> OutboundNotification {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("forward was not attempted")
            .expect("notifier dropped")
    }

    #[tokio::test]
    async fn test_health() {
        for secret in [None, Some(SECRET)] {
            let (app, _rx) = recording_app(secret);
            let request = Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap();
            let (status, body) = send(app, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, r#"{"status":"ok"}"#);
        }
    }

    #[tokio::test]
    async fn test_no_secret_accepts_any_signature() {
        for signature in [None, Some("bogus"), Some("")] {
            let (app, mut rx) = recording_app(None);
            let (status, body) = send(app, webhook_request(BODY, signature)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, ACK_BODY);
            expect_forward(&mut rx).await;
        }
    }

    #[tokio::test]
    async fn test_valid_signature_is_forwarded() {
        let (app, mut rx) = recording_app(Some(SECRET));
        let signature = compute_signature(SECRET, BODY.as_bytes()).unwrap();

        let (status, body) = send(app, webhook_request(BODY, Some(&signature))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ACK_BODY);

        let notification = expect_forward(&mut rx).await;
        assert_eq!(notification.field("Event"), Some("order.paid"));
        assert_eq!(notification.field("Order ID"), Some("A-1001"));
    }

    #[tokio::test]
    async fn test_missing_signature_is_rejected() {
        let (app, mut rx) = recording_app(Some(SECRET));
        let (status, body) = send(app, webhook_request(BODY, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, INVALID_SIGNATURE_BODY);
        assert_no_forward(&mut rx).await;
    }

    #[tokio::test]
    async fn test_wrong_signature_is_rejected() {
        let good = compute_signature(SECRET, BODY.as_bytes()).unwrap();
        let wrong_secret = compute_signature("other-secret", BODY.as_bytes()).unwrap();
        let short = good[..32].to_string();

        for signature in [wrong_secret, short] {
            let (app, mut rx) = recording_app(Some(SECRET));
            let (status, body) = send(app, webhook_request(BODY, Some(&signature))).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body, INVALID_SIGNATURE_BODY);
            assert_no_forward(&mut rx).await;
        }
    }

    #[tokio::test]
    async fn test_custom_signature_header() {
        let mut config = config(Some(SECRET));
        config.signature_header = "x-platform-signature".to_string();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let app = router(AppState::new(config, Arc::new(RecordingNotifier { tx })));

        let signature = compute_signature(SECRET, BODY.as_bytes()).unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("X-Platform-Signature", signature)
            .body(Body::from(BODY))
            .unwrap();

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        expect_forward(&mut rx).await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_internal_error() {
        let (app, mut rx) = recording_app(None);
        let (status, body) = send(app, webhook_request("{not json", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, INTERNAL_ERROR_BODY);
        assert_no_forward(&mut rx).await;
    }

    #[tokio::test]
    async fn test_bad_signature_checked_before_parsing() {
        let (app, _rx) = recording_app(Some(SECRET));
        let (status, _) = send(app, webhook_request("{not json", Some("bogus"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_empty_body_is_accepted() {
        let (app, mut rx) = recording_app(None);
        let (status, _) = send(app, webhook_request("", None)).await;
        assert_eq!(status, StatusCode::OK);
        let notification = expect_forward(&mut rx).await;
        assert_eq!(notification.field(crate::notify::DATA_FIELD), Some("{}"));
    }

    #[tokio::test]
    async fn test_response_does_not_wait_for_forward() {
        let app = router(AppState::new(config(None), Arc::new(HangingNotifier)));

        let response = tokio::time::timeout(
            Duration::from_secs(1),
            send(app, webhook_request(BODY, None)),
        )
        .await
        .expect("response must not wait on the forward");

        assert_eq!(response, (StatusCode::OK, ACK_BODY.to_string()));
    }

    /// Flags every call to `notify`.
    struct FlagNotifier {
        notified: Arc<AtomicBool>,
    }

    impl Notifier for FlagNotifier {
        fn notify<'a>(
            &'a self,
            _notification: &'a OutboundNotification,
        ) -> BoxFuture<'a, Result<ForwardOutcome, ForwardError>> {
            self.notified.store(true, Ordering::SeqCst);
            async { Ok(ForwardOutcome::Delivered) }.boxed()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_forward_not_started_before_response_leaves_service() {
        let notified = Arc::new(AtomicBool::new(false));
        let notified_at_commit = Arc::new(AtomicBool::new(false));

        let notifier = FlagNotifier {
            notified: Arc::clone(&notified),
        };
        let commit = {
            let notified = Arc::clone(&notified);
            let notified_at_commit = Arc::clone(&notified_at_commit);
            move |response: Response| {
                let notified = Arc::clone(&notified);
                let notified_at_commit = Arc::clone(&notified_at_commit);
                async move {
                    // Leave room for an eagerly spawned forward to run.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    notified_at_commit.store(notified.load(Ordering::SeqCst), Ordering::SeqCst);
                    response
                }
            }
        };
        let app = router(AppState::new(config(None), Arc::new(notifier))).layer(map_response(commit));

        let (status, body) = send(app, webhook_request(BODY, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ACK_BODY);
        assert!(
            !notified_at_commit.load(Ordering::SeqCst),
            "forward started before the response left the service"
        );

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !notified.load(Ordering::SeqCst) {
            assert!(tokio::time::Instant::now() < deadline, "forward was not attempted");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// In-memory sink for a scoped subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_unreachable_forward_target_keeps_ok_and_is_logged() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_writer(logs.clone())
            .finish();
        // Current-thread runtime: the spawned forward runs on this thread too.
        let _guard = tracing::subscriber::set_default(subscriber);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = DiscordNotifier::new(
            Client::new(),
            Some(format!("http://{}/hook", addr)),
            Duration::from_millis(500),
        );
        let app = router(AppState::new(config(None), Arc::new(notifier)));

        let (status, body) = send(app, webhook_request(BODY, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, ACK_BODY);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !logs.contents().contains("notification_forward_failed") {
            assert!(
                tokio::time::Instant::now() < deadline,
                "forward failure was not logged: {}",
                logs.contents()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(logs.contents().matches("notification_forward_failed").count(), 1);
        assert!(!logs.contents().contains("discord_forward"));
    }

    #[test]
    fn test_parse_payload() {
        assert_eq!(parse_payload(b"").unwrap(), serde_json::json!({}));
        assert_eq!(parse_payload(b"  \n").unwrap(), serde_json::json!({}));
        assert_eq!(parse_payload(b"[1]").unwrap(), serde_json::json!([1]));
        assert!(parse_payload(b"{").is_err());
    }
}
