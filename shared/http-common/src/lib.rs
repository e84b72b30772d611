//! Shared HTTP utilities for the URL shortener workspace.
//!
//! Framework-agnostic response bodies, short URL building, time formatting,
//! and Basic credential parsing used by api-server.

use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Error body returned for every failed request.
///
/// Returns: `{"error": "<message>"}`
pub fn json_err(message: &str) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

/// Confirmation body for operations without a payload.
///
/// Returns: `{"message": "<message>"}`
pub fn json_message(message: &str) -> serde_json::Value {
    serde_json::json!({ "message": message })
}

// ============================================================================
// URL Building
// ============================================================================

/// Build a short URL from a configured base or the request host.
///
/// A non-empty `base` wins (`{base}/{code}`). Otherwise falls back to
/// `https://{host}/{code}`, or `/{code}` if host is empty.
pub fn build_short_url(base: Option<&str>, host: &str, code: &str) -> String {
    if let Some(base) = base.filter(|b| !b.is_empty()) {
        return format!("{}/{}", base.trim_end_matches('/'), code);
    }
    if host.is_empty() {
        format!("/{}", code)
    } else {
        format!("https://{}/{}", host, code)
    }
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
///
/// Returns `None` for instants chrono cannot represent.
pub fn system_time_to_rfc3339(t: SystemTime) -> Option<String> {
    let secs = match t.duration_since(UNIX_EPOCH) {
        Ok(d) => i64::try_from(d.as_secs()).ok()?,
        Err(e) => {
            let d = e.duration();
            let whole = i64::try_from(d.as_secs()).ok()?;
            // round down to the enclosing second
            -whole - i64::from(d.subsec_nanos() > 0)
        }
    };
    DateTime::<Utc>::from_timestamp(secs, 0).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
}

// ============================================================================
// Basic Authentication
// ============================================================================

/// Decode an `Authorization: Basic <base64(user:pass)>` header value.
///
/// Returns `None` for other schemes, bad base64, non-UTF-8 payloads, or a
/// payload without `:`.
pub fn parse_basic_auth(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}
