//! Structural validation of decoded messages.
//!
//! Each parser checks every constraint and reports all violations, not just
//! the first one. The wire format has no type tag, so callers discriminate
//! request from notification by the presence of the `id` member.

use serde_json::{Map, Value};

use super::message::{ErrorResponse, Notification, Request, Response, SuccessResponse, Version};
use super::{ErrorObject, RequestId, JSONRPC_VERSION};
use crate::schema::Violations;

fn as_object<'a>(value: &'a Value, violations: &mut Violations) -> Option<&'a Map<String, Value>> {
    match value.as_object() {
        Some(obj) => Some(obj),
        None => {
            violations.push("", "message must be a JSON object");
            None
        }
    }
}

fn check_version(obj: &Map<String, Value>, violations: &mut Violations) {
    match obj.get("jsonrpc") {
        Some(Value::String(v)) if v == JSONRPC_VERSION => {}
        Some(_) => violations.push("jsonrpc", "must be exactly \"2.0\""),
        None => violations.push("jsonrpc", "is required"),
    }
}

fn check_method(obj: &Map<String, Value>, violations: &mut Violations) -> Option<String> {
    match obj.get("method") {
        Some(Value::String(m)) if !m.is_empty() => Some(m.clone()),
        Some(Value::String(_)) => {
            violations.push("method", "must not be empty");
            None
        }
        Some(_) => {
            violations.push("method", "must be a string");
            None
        }
        None => {
            violations.push("method", "is required");
            None
        }
    }
}

fn id_from_value(value: &Value) -> Option<RequestId> {
    match value {
        Value::String(s) => Some(RequestId::String(s.clone())),
        Value::Number(n) => n.as_i64().map(RequestId::Number),
        _ => None,
    }
}

/// The message's `id` if present and usable as a request id.
pub fn extract_id(value: &Value) -> Option<RequestId> {
    value.get("id").and_then(id_from_value)
}

/// Validate `value` as a request (has an `id`).
pub fn parse_as_request(value: &Value) -> Result<Request, Violations> {
    // ---
    let mut violations = Violations::new();
    let Some(obj) = as_object(value, &mut violations) else {
        return Err(violations);
    };

    check_version(obj, &mut violations);
    let method = check_method(obj, &mut violations);

    let id = match obj.get("id") {
        Some(raw) => {
            let id = id_from_value(raw);
            if id.is_none() {
                violations.push("id", "must be a string or an integer");
            }
            id
        }
        None => {
            violations.push("id", "is required");
            None
        }
    };

    match (method, id) {
        (Some(method), Some(id)) if violations.is_empty() => Ok(Request {
            jsonrpc: Version,
            method,
            params: obj.get("params").cloned(),
            id,
        }),
        _ => Err(violations),
    }
}

/// Validate `value` as a notification (must not have an `id`, not even `null`).
pub fn parse_as_notification(value: &Value) -> Result<Notification, Violations> {
    // ---
    let mut violations = Violations::new();
    let Some(obj) = as_object(value, &mut violations) else {
        return Err(violations);
    };

    check_version(obj, &mut violations);
    let method = check_method(obj, &mut violations);

    if obj.contains_key("id") {
        violations.push("id", "notifications must not carry an id");
    }

    match method {
        Some(method) if violations.is_empty() => Ok(Notification {
            jsonrpc: Version,
            method,
            params: obj.get("params").cloned(),
        }),
        _ => Err(violations),
    }
}

fn parse_error_object(raw: &Value, violations: &mut Violations) -> Option<ErrorObject> {
    // ---
    let Some(obj) = raw.as_object() else {
        violations.push("error", "must be an object");
        return None;
    };

    let code = match obj.get("code") {
        Some(Value::Number(n)) => {
            let code = n.as_i64();
            if code.is_none() {
                violations.push("error.code", "must be an integer");
            }
            code
        }
        Some(_) => {
            violations.push("error.code", "must be an integer");
            None
        }
        None => {
            violations.push("error.code", "is required");
            None
        }
    };

    let message = match obj.get("message") {
        Some(Value::String(m)) => Some(m.clone()),
        Some(_) => {
            violations.push("error.message", "must be a string");
            None
        }
        None => {
            violations.push("error.message", "is required");
            None
        }
    };

    Some(ErrorObject {
        code: code?,
        message: message?,
        data: obj.get("data").cloned(),
    })
}

/// Validate `value` as a response: exactly one of `result` / `error`.
pub fn parse_as_response(value: &Value) -> Result<Response, Violations> {
    // ---
    let mut violations = Violations::new();
    let Some(obj) = as_object(value, &mut violations) else {
        return Err(violations);
    };

    check_version(obj, &mut violations);

    let result = obj.get("result");
    let error = obj.get("error");

    match (result, error) {
        (Some(_), Some(_)) => violations.push("", "must not carry both result and error"),
        (None, None) => violations.push("", "must carry either result or error"),
        _ => {}
    }

    let error = error.and_then(|raw| parse_error_object(raw, &mut violations));

    let id = match obj.get("id") {
        Some(Value::Null) => {
            if result.is_some() {
                violations.push("id", "may only be null on error responses");
            }
            None
        }
        Some(raw) => {
            let id = id_from_value(raw);
            if id.is_none() {
                violations.push("id", "must be a string, an integer or null");
            }
            id
        }
        None => {
            violations.push("id", "is required");
            None
        }
    };

    if !violations.is_empty() {
        return Err(violations);
    }

    match (result, error, id) {
        (Some(result), None, Some(id)) => Ok(Response::Success(SuccessResponse {
            jsonrpc: Version,
            result: result.clone(),
            id,
        })),
        (None, Some(error), id) => Ok(Response::Error(ErrorResponse {
            jsonrpc: Version,
            error,
            id,
        })),
        _ => {
            violations.push("", "malformed response");
            Err(violations)
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::protocol::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_request_ok() {
        // ---
        let req = parse_as_request(&json!({
            "jsonrpc": "2.0", "method": "echo", "params": {"message": "hi"}, "id": 1
        }))
        .unwrap();

        assert_eq!(req.method, "echo");
        assert_eq!(req.id, RequestId::Number(1));
        assert_eq!(req.params, Some(json!({"message": "hi"})));
    }

    #[test]
    fn test_request_reports_every_violation() {
        // ---
        let err = parse_as_request(&json!({"jsonrpc": "1.0", "method": "", "id": true}))
            .unwrap_err();

        assert_eq!(err.len(), 3);
        let paths: Vec<&str> = err.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["jsonrpc", "method", "id"]);
    }

    #[test]
    fn test_request_rejects_null_and_object_ids() {
        // ---
        for id in [json!(null), json!({"a": 1}), json!(1.5)] {
            let err =
                parse_as_request(&json!({"jsonrpc": "2.0", "method": "m", "id": id})).unwrap_err();
            assert_eq!(err.len(), 1);
        }
    }

    #[test]
    fn test_notification_rejects_null_id() {
        // ---
        let err = parse_as_notification(&json!({"jsonrpc": "2.0", "method": "m", "id": null}))
            .unwrap_err();
        assert_eq!(err.iter().next().unwrap().path, "id");
    }

    #[test]
    fn test_notification_ok() {
        // ---
        let note = parse_as_notification(&json!({"jsonrpc": "2.0", "method": "tick"})).unwrap();
        assert_eq!(note.method, "tick");
        assert_eq!(note.params, None);
    }

    #[test]
    fn test_response_with_both_members_is_invalid() {
        // ---
        let err = parse_as_response(&json!({
            "jsonrpc": "2.0", "result": 1,
            "error": {"code": -32603, "message": "x"}, "id": 1
        }))
        .unwrap_err();
        assert!(err.to_string().contains("both"));
    }

    #[test]
    fn test_success_round_trip() {
        // ---
        for result in [json!(null), json!(0), json!("s"), json!([1, {"a": [true]}])] {
            let original = Response::success(result, RequestId::from("id-1"));
            let text = original.encode().unwrap();
            let decoded = parse_as_response(&serde_json::from_str(&text).unwrap()).unwrap();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_error_response_null_id() {
        // ---
        let decoded = parse_as_response(&json!({
            "jsonrpc": "2.0", "error": {"code": -32700, "message": "Parse error"}, "id": null
        }))
        .unwrap();

        assert_eq!(
            decoded,
            Response::standard_error(ErrorCode::ParseError, None, None)
        );
    }

    #[test]
    fn test_extract_id() {
        // ---
        assert_eq!(extract_id(&json!({"id": "x"})), Some(RequestId::from("x")));
        assert_eq!(extract_id(&json!({"id": false})), None);
        assert_eq!(extract_id(&json!([1])), None);
    }
}
