//! Configuration module for environment variable parsing.
//!
//! Everything is read once at startup into an immutable [`Config`] which is
//! then shared with the handlers through [`crate::AppState`].

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;
use url::Url;

/// Default header carrying the U7BUY HMAC signature.
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-u7buy-signature";

/// Application configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Discord webhook receiving forwarded notifications. `None` disables forwarding.
    pub discord_webhook_url: Option<String>,

    /// Shared secret for HMAC-SHA256 verification. `None` disables verification.
    pub u7buy_secret: Option<String>,

    /// Name of the inbound header carrying the hex signature (lowercase)
    pub signature_header: String,

    /// Refuse to start when no secret is configured
    pub require_signature: bool,

    /// Timeout for the outbound Discord request
    pub forward_timeout: Duration,

    /// Append-only log file. `None` logs to stdout only.
    pub log_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Config {
            port: parse_or("PORT", &lookup, 3000),

            discord_webhook_url: lookup("DISCORD_WEBHOOK_URL")
                .and_then(|raw| parse_webhook_url(&raw)),

            u7buy_secret: non_empty(lookup("U7BUY_SECRET")),

            signature_header: non_empty(lookup("U7BUY_SIGNATURE_HEADER"))
                .map(|h| h.trim().to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string()),

            require_signature: lookup("U7BUY_REQUIRE_SIGNATURE")
                .map(|v| parse_bool(&v))
                .unwrap_or(false),

            forward_timeout: Duration::from_millis(parse_or(
                "FORWARD_TIMEOUT_MS",
                &lookup,
                5000,
            )),

            log_file: match lookup("LOG_FILE") {
                Some(path) if path.trim().is_empty() => None,
                Some(path) => Some(PathBuf::from(path)),
                None => Some(PathBuf::from("webhook.log")),
            },
        }
    }

    /// Whether inbound requests are checked against the shared secret.
    pub fn verification_enabled(&self) -> bool {
        crate::web::is_signature_verification_enabled(&self.u7buy_secret)
    }

    /// Whether verified payloads are forwarded to Discord.
    pub fn forwarding_enabled(&self) -> bool {
        self.discord_webhook_url.is_some()
    }

    /// Reject configurations that cannot be run safely.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.require_signature && !self.verification_enabled() {
            anyhow::bail!("U7BUY_REQUIRE_SIGNATURE is set but U7BUY_SECRET is empty");
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("discord_webhook_url", &self.discord_webhook_url.as_ref().map(|_| "<redacted>"))
            .field("u7buy_secret", &self.u7buy_secret.as_ref().map(|_| "<redacted>"))
            .field("signature_header", &self.signature_header)
            .field("require_signature", &self.require_signature)
            .field("forward_timeout", &self.forward_timeout)
            .field("log_file", &self.log_file)
            .finish()
    }
}

fn parse_or<T, F>(name: &str, lookup: &F, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };

    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Only http(s) URLs are usable as a forward target.
fn parse_webhook_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(raw.to_string()),
        Ok(url) => {
            warn!(scheme = url.scheme(), "discord_webhook_url_unsupported_scheme");
            None
        }
        Err(e) => {
            warn!(error = %e, "discord_webhook_url_invalid");
            None
        }
    }
}
