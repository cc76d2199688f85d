//! U7Relay - webhook relay from U7BUY to Discord.
//!
//! The `u7buy-relay` binary receives U7BUY webhook notifications, verifies
//! their HMAC signature when a secret is configured, acknowledges them right
//! away and forwards a summary to a Discord webhook in the background.
//!
//! ## Architecture
//!
//! ```text
//! U7BUY → POST /webhook → verify → 200 OK
//!                                  └─→ detached task → Discord webhook
//! ```

pub mod config;
pub mod logging;
pub mod notify;
pub mod web;

// Re-export commonly used types
pub use config::Config;
pub use notify::{DiscordNotifier, ForwardError, ForwardOutcome, Notifier, OutboundNotification};
pub use web::{router, AppState, VerificationResult};
