//! Response-shape normalization and business-code evaluation.

use serde_json::Value;

use crate::config::{DEFAULT_RETCODE_KEY, RetcodeKey, Whitelist};
use crate::error::RequestError;

/// Copies the configured business-code field into the canonical `retcode` field.
///
/// A single field name other than `retcode` is copied verbatim (its absence
/// clears `retcode`). A candidate list copies the first candidate present in
/// the payload; later candidates are ignored. Non-object payloads are left
/// untouched.
pub(crate) fn normalize_retcode(data: &mut Value, key: &RetcodeKey) {
    let Value::Object(map) = data else {
        return;
    };

    match key {
        RetcodeKey::Disabled => {}
        RetcodeKey::Field(name) if name == DEFAULT_RETCODE_KEY => {}
        RetcodeKey::Field(name) => match map.get(name).cloned() {
            Some(code) => {
                map.insert(DEFAULT_RETCODE_KEY.to_string(), code);
            }
            None => {
                map.remove(DEFAULT_RETCODE_KEY);
            }
        },
        RetcodeKey::Candidates(names) => {
            if let Some(code) = names.iter().find_map(|name| map.get(name)).cloned() {
                map.insert(DEFAULT_RETCODE_KEY.to_string(), code);
            }
        }
    }
}

/// Decides business-level success for a normalized payload.
///
/// Success when either the key or the whitelist is disabled, when the
/// canonical code is numerically zero, or when the whitelist lists it.
///
/// # Errors
///
/// Returns [`RequestError::Logic`] carrying the derived message and the
/// canonical code otherwise.
pub(crate) fn evaluate_retcode(
    data: &Value,
    key: &RetcodeKey,
    white_list: &Whitelist,
    msg_key: Option<&str>,
    msg_unknown: &str,
) -> Result<(), RequestError> {
    if !key.is_enabled() || !white_list.is_enabled() {
        return Ok(());
    }

    let code = data.get(DEFAULT_RETCODE_KEY);
    if let Some(code) = code
        && (is_neutral_code(code) || white_list.contains(code))
    {
        return Ok(());
    }

    Err(RequestError::logic(
        logic_error_message(data, msg_key, msg_unknown),
        code.cloned(),
    ))
}

fn is_neutral_code(code: &Value) -> bool {
    code.as_f64().is_some_and(|n| n == 0.0)
}

/// Derives a logic error message from a response payload.
///
/// Looks up `key` directly; failing that, a dotted key is resolved one level
/// deep on its first two segments (`"errData.text"` reads `data.errData.text`).
/// Only non-empty strings count as messages. Falls back to `unknown`.
///
/// ```
/// use cloudsea_core::logic_error_message;
/// use serde_json::json;
///
/// let data = json!({"errData": {"text": "bad"}});
/// assert_eq!(logic_error_message(&data, Some("errData.text"), "unknown"), "bad");
/// assert_eq!(logic_error_message(&json!({}), Some("errData.text"), "unknown"), "unknown");
/// ```
#[must_use]
pub fn logic_error_message(data: &Value, key: Option<&str>, unknown: &str) -> String {
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        return unknown.to_string();
    };

    if let Some(message) = non_empty_str(data.get(key)) {
        return message.to_string();
    }

    let mut segments = key.split('.');
    if let (Some(outer), Some(inner)) = (segments.next(), segments.next())
        && let Some(message) = non_empty_str(data.get(outer).and_then(|v| v.get(inner)))
    {
        return message.to_string();
    }

    unknown.to_string()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}
