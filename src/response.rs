//! Response normalization shared by both client personalities.
//!
//! The transports hand every finished exchange to [`normalize_response`]
//! and every transport failure to [`classify_transport_error`], so both
//! personalities classify outcomes identically.

use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::error::ClientError;

/// Decoded body of a successful response.
///
/// [`Payload::Empty`] marks a response without content. It is distinct
/// from a JSON `null` and from an empty collection, so callers can tell
/// "the service sent nothing" apart from "the service sent an empty
/// result".
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body parsed as JSON.
    Json(Value),
    /// Body that is not valid JSON, returned verbatim.
    Text(String),
    /// No body.
    Empty,
}

impl Payload {
    /// JSON value of the payload, if it has one.
    pub fn json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the payload and returns its JSON value, if it has one.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// `true` for the no-content sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Classifies one finished HTTP exchange into a payload or a typed error.
///
/// Timeouts never reach this function; they are classified from the
/// transport error before any response exists.
pub fn normalize_response(
    status: StatusCode,
    url: &str,
    body: &str,
) -> Result<Payload, ClientError> {
    if !status.is_success() {
        let detail = error_detail(body);
        let url = url.to_owned();
        return Err(if status.as_u16() >= 500 {
            ClientError::Server { status, url, detail }
        } else {
            ClientError::Client { status, url, detail }
        });
    }

    if body.trim().is_empty() {
        return Ok(Payload::Empty);
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => match soft_failure_message(&value) {
            Some(message) => Err(ClientError::RequestFailed { message }),
            None => Ok(Payload::Json(value)),
        },
        Err(_) => Ok(Payload::Text(body.to_owned())),
    }
}

/// Maps a transport-layer failure onto the error taxonomy.
///
/// `method` and `path` name the logical request so timeout errors stay
/// diagnosable without the URL that never produced a response.
pub fn classify_transport_error(error: reqwest::Error, method: &Method, path: &str) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout {
            method: method.to_string(),
            path: path.to_owned(),
            source: error,
        }
    } else {
        ClientError::Transport(error)
    }
}

/// Best error description a failed response body has to offer.
///
/// Looks for the JSON `detail` field first, then the JSON `error` field,
/// then falls back to the raw body text.
fn error_detail(body: &str) -> String {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "error"] {
            match fields.get(key) {
                Some(Value::String(text)) => return text.clone(),
                Some(other) => return other.to_string(),
                None => {}
            }
        }
    }
    body.to_owned()
}

/// Detects the `"success": false` convention some endpoints use to report
/// failure inside a 2xx response.
fn soft_failure_message(value: &Value) -> Option<String> {
    let fields = value.as_object()?;
    if fields.get("success").and_then(Value::as_bool) == Some(false) {
        let message = fields
            .get("msg")
            .and_then(Value::as_str)
            .filter(|msg| !msg.is_empty())
            .unwrap_or("(no error message)");
        Some(message.to_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const URL: &str = "http://localhost:8080/save-restore/node/abc";

    #[test]
    fn empty_body_maps_to_the_no_content_sentinel() {
        let payload = normalize_response(StatusCode::OK, URL, "  \n").unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn no_content_is_distinct_from_null_and_empty_collections() {
        let empty = normalize_response(StatusCode::OK, URL, "").unwrap();
        let null = normalize_response(StatusCode::OK, URL, "null").unwrap();
        let list = normalize_response(StatusCode::OK, URL, "[]").unwrap();
        assert_ne!(empty, null);
        assert_ne!(empty, list);
        assert_ne!(null, list);
        assert_eq!(null, Payload::Json(Value::Null));
        assert_eq!(list, Payload::Json(json!([])));
    }

    #[test]
    fn non_json_success_body_is_returned_verbatim() {
        let payload = normalize_response(StatusCode::OK, URL, "plain text here").unwrap();
        assert_eq!(payload, Payload::Text("plain text here".into()));
    }

    #[test]
    fn status_below_500_is_a_client_error_with_detail() {
        let body = r#"{"detail": "Node not found", "error": "shadowed"}"#;
        let err = normalize_response(StatusCode::NOT_FOUND, URL, body).unwrap_err();
        match err {
            ClientError::Client { status, url, detail } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(url, URL);
                assert_eq!(detail, "Node not found");
            }
            other => panic!("expected a client error, got {other:?}"),
        }
    }

    #[test]
    fn status_of_500_and_above_is_a_server_error() {
        let err = normalize_response(StatusCode::BAD_GATEWAY, URL, "gateway down").unwrap_err();
        assert!(matches!(err, ClientError::Server { .. }));
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn detail_extraction_falls_back_to_error_then_raw_text() {
        let err = normalize_response(StatusCode::BAD_REQUEST, URL, r#"{"error": "bad input"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("bad input"));

        let err = normalize_response(StatusCode::BAD_REQUEST, URL, "not json at all").unwrap_err();
        assert!(err.to_string().contains("not json at all"));
    }

    #[test]
    fn redirects_are_classified_as_client_errors() {
        let err = normalize_response(StatusCode::FOUND, URL, "").unwrap_err();
        assert!(matches!(err, ClientError::Client { .. }));
    }

    #[test]
    fn success_false_marker_fails_despite_the_2xx_status() {
        let body = r#"{"success": false, "msg": "PV read failed"}"#;
        let err = normalize_response(StatusCode::OK, URL, body).unwrap_err();
        match err {
            ClientError::RequestFailed { message } => assert_eq!(message, "PV read failed"),
            other => panic!("expected a soft failure, got {other:?}"),
        }
    }

    #[test]
    fn success_false_without_message_gets_a_placeholder() {
        let err = normalize_response(StatusCode::OK, URL, r#"{"success": false}"#).unwrap_err();
        assert!(err.to_string().contains("(no error message)"));

        let err =
            normalize_response(StatusCode::OK, URL, r#"{"success": false, "msg": ""}"#).unwrap_err();
        assert!(err.to_string().contains("(no error message)"));
    }

    #[test]
    fn success_true_and_unmarked_bodies_pass_through() {
        let marked = normalize_response(StatusCode::OK, URL, r#"{"success": true}"#).unwrap();
        assert_eq!(marked, Payload::Json(json!({"success": true})));

        let unmarked = normalize_response(StatusCode::OK, URL, r#"{"uniqueId": "abc"}"#).unwrap();
        assert_eq!(unmarked, Payload::Json(json!({"uniqueId": "abc"})));
    }
}
