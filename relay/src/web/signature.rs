//! U7BUY webhook signature verification.
//!
//! U7BUY signs the exact request body with HMAC-SHA256 using the shared
//! secret and sends the lowercase hex digest in a header
//! (`x-u7buy-signature` unless configured otherwise).
//!
//! Verification is policy-gated: with no secret configured every request is
//! accepted as [`VerificationResult::SkippedNoSecretConfigured`]. That is the
//! default deployment mode and it is permissive; set `U7BUY_SECRET` (and
//! optionally `U7BUY_REQUIRE_SIGNATURE`) in production.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Outcome of checking an inbound request against the shared secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationResult {
    /// Signature present and matching.
    Valid,
    /// Secret configured, signature absent or not matching.
    Invalid,
    /// No secret configured, the request was not checked.
    SkippedNoSecretConfigured,
}

impl VerificationResult {
    /// Whether the request may proceed to acknowledgment and forwarding.
    pub fn is_authorized(self) -> bool {
        !matches!(self, VerificationResult::Invalid)
    }
}

/// Verify a U7BUY webhook signature over the raw request body.
///
/// # Arguments
///
/// * `raw_body` - The request body exactly as received on the wire
/// * `signature` - The signature header value, if any
/// * `secret` - The shared secret, if configured
///
/// Never panics: a missing header, non-hex or non-UTF-8 bytes and length
/// mismatches all come back as [`VerificationResult::Invalid`].
pub fn verify(raw_body: &[u8], signature: Option<&[u8]>, secret: Option<&str>) -> VerificationResult {
    let secret = match secret {
        Some(s) if !s.trim().is_empty() => s,
        _ => return VerificationResult::SkippedNoSecretConfigured,
    };

    let provided = match signature {
        Some(sig) if !sig.is_empty() => sig,
        _ => {
            warn!("u7buy_signature_missing");
            return VerificationResult::Invalid;
        }
    };

    let expected = match compute_signature(secret, raw_body) {
        Some(sig) => sig,
        None => {
            warn!("u7buy_signature_invalid_key");
            return VerificationResult::Invalid;
        }
    };

    if constant_time_compare(expected.as_bytes(), provided) {
        VerificationResult::Valid
    } else {
        warn!(
            expected_length = expected.len(),
            actual_length = provided.len(),
            "u7buy_signature_mismatch"
        );
        VerificationResult::Invalid
    }
}

/// Compute the lowercase hex HMAC-SHA256 of `body` keyed with `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time byte comparison; lengths are public, contents are not.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Check if U7BUY signature verification is enabled.
pub fn is_signature_verification_enabled(secret: &Option<String>) -> bool {
    secret
        .as_ref()
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false)
}
