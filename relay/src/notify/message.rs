//! Outbound notification built from a verified U7BUY payload.
//!
//! The `Data` field is capped at [`MAX_FIELD_CHARS`] characters plus the
//! marker. Discord itself rejects embed field values over 1024 characters,
//! so payloads rendering between 1024 and 1900 characters (or truncated
//! ones) get a 400 from the real endpoint, which surfaces as a logged
//! `ForwardError::Status`.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Longest payload rendering kept in the data field, in characters.
pub const MAX_FIELD_CHARS: usize = 1900;

/// Appended when the payload rendering was cut.
pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

/// Name of the field holding the pretty-printed payload.
pub const DATA_FIELD: &str = "Data";

const TITLE: &str = "U7BUY Webhook";

/// Keys probed, in order, for the event name.
const EVENT_KEYS: &[&str] = &["event", "event_type", "type"];

/// Keys probed, in order, for the order identifier.
const ORDER_KEYS: &[&str] = &["order_id", "orderId", "order_no", "id"];

/// A single name/value pair of the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
}

/// Chat-friendly summary of one inbound webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundNotification {
    pub title: String,
    pub description: String,
    pub fields: Vec<NotificationField>,
    pub timestamp: DateTime<Utc>,
}

impl OutboundNotification {
    /// Build the notification for `payload` received at `received_at`.
    ///
    /// The result depends only on its inputs.
    pub fn from_payload(payload: &Value, received_at: DateTime<Utc>) -> Self {
        let event = first_string(payload, EVENT_KEYS);
        let order_id = first_string(payload, ORDER_KEYS);

        let description = match &event {
            Some(event) => format!("Received `{}` notification from U7BUY.", event),
            None => "Received a notification from U7BUY.".to_string(),
        };

        let mut fields = Vec::with_capacity(3);
        if let Some(event) = event {
            fields.push(NotificationField {
                name: "Event".to_string(),
                value: event,
            });
        }
        if let Some(order_id) = order_id {
            fields.push(NotificationField {
                name: "Order ID".to_string(),
                value: order_id,
            });
        }
        fields.push(NotificationField {
            name: DATA_FIELD.to_string(),
            value: render_payload(payload),
        });

        Self {
            title: TITLE.to_string(),
            description,
            fields,
            timestamp: received_at,
        }
    }

    /// Look up a field value by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Pretty-print the payload, capped to [`MAX_FIELD_CHARS`].
pub fn render_payload(payload: &Value) -> String {
    let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    truncate(pretty, MAX_FIELD_CHARS)
}

/// Cut `text` to `max_chars` characters and append [`TRUNCATION_MARKER`].
///
/// Counts characters, so multi-byte text is never split mid-character.
pub fn truncate(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
            out.push_str(&text[..cut]);
            out.push_str(TRUNCATION_MARKER);
            out
        }
        None => text,
    }
}

fn first_string(payload: &Value, keys: &[&str]) -> Option<String> {
    let object = payload.as_object()?;
    keys.iter().find_map(|key| match object.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
