//! Quota detection for chat API responses
//!
//! Separates per-minute rate limits (429 with a generic message) from spent
//! daily quota (429 naming a per-day token or request limit). Only spent quota
//! and rejected keys take a key out of rotation.

use chat::ErrorClassification;

/// Phrases in a 429 body that mean the key's daily allowance is gone.
const QUOTA_PATTERNS: &[&str] = &[
    "per day",
    "(tpd)",
    "(rpd)",
    "insufficient_quota",
    "quota",
];

/// Classify a 429 body as spent quota or a transient rate limit.
pub fn classify_429(body: &str) -> ErrorClassification {
    let lower = body.to_lowercase();
    if QUOTA_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorClassification::QuotaExceeded
    } else {
        ErrorClassification::Transient
    }
}

/// Classify an upstream error by HTTP status and response body.
///
/// 401/403 are Permanent (invalid or revoked key), 429 goes through
/// `classify_429`, everything else is Transient.
pub fn classify_status(status: u16, body: &str) -> ErrorClassification {
    match status {
        401 | 403 => ErrorClassification::Permanent,
        429 => classify_429(body),
        _ => ErrorClassification::Transient,
    }
}
