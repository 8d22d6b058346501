//! Response checks shared by the provider adapters.

use serde_json::Value;

use crate::error::DeliveryError;

/// Read a provider response as JSON, treating non-2xx statuses and
/// unparseable bodies as rejections.
pub(crate) async fn read_json(provider: &str, resp: reqwest::Response) -> Result<Value, DeliveryError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| DeliveryError::transport(provider, e))?;

    if !status.is_success() {
        return Err(DeliveryError::rejected(
            provider,
            format!("HTTP {status}: {}", truncate(&text, 300)),
        ));
    }

    serde_json::from_str(&text).map_err(|e| {
        DeliveryError::rejected(provider, format!("unparseable response ({e}): {}", truncate(&text, 300)))
    })
}

/// Slack and Telegram report success as `"ok": true` and put the reason in
/// `error` or `description` otherwise.
pub(crate) fn expect_ok_flag(provider: &str, body: &Value) -> Result<(), DeliveryError> {
    if body.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let reason = body
        .get("error")
        .or_else(|| body.get("description"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(DeliveryError::rejected(provider, reason))
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}…")
}
