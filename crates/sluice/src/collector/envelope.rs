//! ✉️ The HEC envelope: `{"event":<payload>,"index":"..","source":"..","sourcetype":".."}`.
//!
//! A payload that already looks like a JSON object or a JSON string rides as-is. Anything
//! else gets quoted first, so the envelope stays valid JSON no matter what we were handed.

use anyhow::{Context, Result};

fn looks_like(payload: &str, open: char, close: char) -> bool {
    payload.len() >= 2 && payload.starts_with(open) && payload.ends_with(close)
}

pub fn wrap_event(serialized: &str, index: &str, source: &str, sourcetype: &str) -> Result<String> {
    let payload = if looks_like(serialized, '{', '}') || looks_like(serialized, '"', '"') {
        serialized.to_string()
    } else {
        serde_json::to_string(serialized).context("💀 Could not quote the event payload")?
    };
    let quote = |value: &str| {
        serde_json::to_string(value).context("💀 Could not quote an envelope field")
    };
    Ok(format!(
        r#"{{"event":{payload},"index":{},"source":{},"sourcetype":{}}}"#,
        quote(index)?,
        quote(source)?,
        quote(sourcetype)?
    ))
}
