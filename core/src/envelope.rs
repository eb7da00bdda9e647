use serde::Deserialize;
use serde_json::Value;

use crate::error::DoorayError;

/// Wire-level wrapper returned by every Dooray endpoint. List endpoints add
/// a top-level `totalCount` next to the result array.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub header: ResponseHeader,
    #[serde(default)]
    pub result: Value,
    #[serde(rename = "totalCount", default)]
    pub total_count: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseHeader {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// One page of a list endpoint. `total_count` is the server's number, passed
/// through unmodified; it is not reconciled against `data.len()`.
#[derive(Debug, Clone)]
pub struct Page {
    pub total_count: u64,
    pub data: Value,
}

/// Collapses the scalar envelope shape into its payload, failing uniformly
/// when the header reports a remote-side failure.
pub fn unwrap(response: ApiResponse) -> Result<Value, DoorayError> {
    if response.header.success {
        return Ok(response.result);
    }
    let message = if response.header.message.trim().is_empty() {
        "remote call failed".to_string()
    } else {
        response.header.message
    };
    Err(DoorayError::remote(message))
}

/// Paginated counterpart of [`unwrap`]: same failure rule, and the wire
/// `totalCount` rides along with the unwrapped list.
pub fn unwrap_paginated(response: ApiResponse) -> Result<Page, DoorayError> {
    let total_count = response.total_count.unwrap_or(0);
    let data = unwrap(ApiResponse {
        total_count: None,
        ..response
    })?;
    Ok(Page { total_count, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: Value) -> ApiResponse {
        serde_json::from_value(raw).expect("envelope should deserialize")
    }

    #[test]
    fn unwrap_returns_payload_on_success() {
        let response = parse(json!({
            "header": { "success": true, "message": "" },
            "result": { "id": "42", "name": "Alice" }
        }));
        let payload = unwrap(response).unwrap();
        assert_eq!(payload, json!({ "id": "42", "name": "Alice" }));
    }

    #[test]
    fn unwrap_fails_with_the_envelope_message() {
        let response = parse(json!({
            "header": { "success": false, "message": "project not found" },
            "result": null
        }));
        let err = unwrap(response).unwrap_err();
        match err {
            DoorayError::Remote { message, .. } => assert_eq!(message, "project not found"),
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn unwrap_substitutes_a_fallback_for_an_empty_failure_message() {
        let response = parse(json!({
            "header": { "success": false, "message": "  " },
            "result": null
        }));
        let err = unwrap(response).unwrap_err();
        assert_eq!(err.to_string(), "remote call failed");
    }

    #[test]
    fn unwrap_paginated_passes_total_count_through_unmodified() {
        let response = parse(json!({
            "header": { "success": true, "message": "" },
            "result": [ { "id": "1" }, { "id": "2" } ],
            "totalCount": 977
        }));
        let page = unwrap_paginated(response).unwrap();
        assert_eq!(page.total_count, 977);
        assert_eq!(page.data, json!([ { "id": "1" }, { "id": "2" } ]));
    }

    #[test]
    fn unwrap_paginated_defaults_missing_total_count_to_zero() {
        let response = parse(json!({
            "header": { "success": true, "message": "" },
            "result": []
        }));
        let page = unwrap_paginated(response).unwrap();
        assert_eq!(page.total_count, 0);
    }

    #[test]
    fn unwrap_paginated_fails_like_unwrap_on_failure_headers() {
        let response = parse(json!({
            "header": { "success": false, "message": "forbidden drive" },
            "result": [],
            "totalCount": 3
        }));
        let err = unwrap_paginated(response).unwrap_err();
        assert_eq!(err.to_string(), "forbidden drive");
    }

    #[test]
    fn header_message_is_optional_on_the_wire() {
        let response = parse(json!({
            "header": { "success": true },
            "result": {}
        }));
        assert!(unwrap(response).is_ok());
    }
}
