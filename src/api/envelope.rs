use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DispatchError;

/// The upstream API is inconsistent about wrapping: some endpoints return
/// `{ "success": bool, "data": ..., "error": ... }`, others a bare object.
/// Unwrap defensively: a body with a `success` key is treated as an
/// envelope, anything else passes through untouched.
pub fn unwrap_envelope(value: Value) -> Result<Value, DispatchError> {
    let Value::Object(map) = value else {
        return Ok(value);
    };

    if !map.contains_key("success") {
        return Ok(Value::Object(map));
    }

    let success = map.get("success").and_then(Value::as_bool).unwrap_or(false);
    if success {
        Ok(map.get("data").cloned().unwrap_or(Value::Null))
    } else {
        let message = map
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("request rejected");
        Err(DispatchError::Internal(format!(
            "backend rejected request: {message}"
        )))
    }
}

/// Read a response body through the envelope heuristic into a typed payload.
pub async fn parse_payload<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, DispatchError> {
    let value: Value = response.json().await?;
    let inner = unwrap_envelope(value)?;
    serde_json::from_value(inner)
        .map_err(|err| DispatchError::Internal(format!("malformed payload: {err}")))
}
