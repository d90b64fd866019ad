//! Shared HTTP utilities for the affiliate link service.
//!
//! Provides the JSON response envelope, date parameter helpers and short URL
//! rendering used by the api-server.

use chrono::NaiveDate;
use serde::Serialize;

// ============================================================================
// Response Envelope (framework-agnostic)
// ============================================================================

/// Code carried by every successful response.
pub const SUCCESS_CODE: u32 = 0;
/// Code for malformed requests that never reached a service.
pub const VALIDATION_CODE: u32 = 9000;

/// Body shape shared by every JSON response:
/// `{"success", "code", "message", "txn_id", "data"}`. `data` is omitted when empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub code: u32,
    pub message: String,
    pub txn_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn ok(txn_id: &str, message: &str, data: T) -> Self {
        Self {
            success: true,
            code: SUCCESS_CODE,
            message: message.to_string(),
            txn_id: txn_id.to_string(),
            data: Some(data),
        }
    }
}

impl Envelope<()> {
    /// A successful response without payload.
    pub fn done(txn_id: &str, message: &str) -> Self {
        Self {
            success: true,
            code: SUCCESS_CODE,
            message: message.to_string(),
            txn_id: txn_id.to_string(),
            data: None,
        }
    }

    pub fn fail(txn_id: &str, code: u32, message: &str) -> Self {
        Self {
            success: false,
            code,
            message: message.to_string(),
            txn_id: txn_id.to_string(),
            data: None,
        }
    }
}

// ============================================================================
// Date Parameters
// ============================================================================

/// Parse a `YYYY-MM-DD` query value. Empty strings count as absent.
pub fn parse_date_param(raw: Option<&str>) -> Result<Option<NaiveDate>, String> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("invalid date '{s}', expected YYYY-MM-DD")),
    }
}

// ============================================================================
// URL Building
// ============================================================================

/// Public redirect URL for a short code.
///
/// Uses `domain` (the configured short link base) when present, otherwise
/// `https://{host}/go/{code}`, or a relative path when the host is unknown.
pub fn build_short_url(domain: Option<&str>, host: &str, code: &str) -> String {
    if let Some(dom) = domain.filter(|d| !d.is_empty()) {
        return format!("{}/go/{}", dom.trim_end_matches('/'), code);
    }
    if host.is_empty() {
        format!("/go/{}", code)
    } else {
        format!("https://{}/go/{}", host, code)
    }
}
