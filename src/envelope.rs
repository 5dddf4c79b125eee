//! The JSON envelope spoken on top of text frames.
//!
//! Every application message is an object carrying a `route` (which
//! handler table), an `event` (which handler within the table), an
//! optional client-chosen correlation `id` echoed back verbatim, and a
//! free-form `data` payload. Responses add an `error` field that is
//! `null` on success.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// An inbound application message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation value chosen by the client (integer or string).
    #[serde(default)]
    pub id: Option<Value>,
    /// Event name within the route's handler table.
    pub event: String,
    /// Name of the handler table.
    pub route: String,
    /// Free-form payload, `{}` when omitted.
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl Request {
    /// Build a request, mainly for clients and tests.
    pub fn new<R: Into<String>, E: Into<String>>(route: R, event: E) -> Self {
        Self {
            id: None,
            event: event.into(),
            route: route.into(),
            data: empty_object(),
        }
    }

    /// Attach a correlation id.
    pub fn with_id<V: Into<Value>>(mut self, id: V) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a data payload.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// An outbound application message.
///
/// Mirrors the request it answers, so clients can correlate the two by
/// `id` regardless of the order responses arrive in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation value copied from the request.
    #[serde(default)]
    pub id: Option<Value>,
    /// Event name copied from the request.
    pub event: String,
    /// Route name copied from the request.
    pub route: String,
    /// Result payload.
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Error message, `null` on success.
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    /// A successful response to `request` carrying `data`.
    pub fn success(request: &Request, data: Value) -> Self {
        Self {
            id: request.id.clone(),
            event: request.event.clone(),
            route: request.route.clone(),
            data,
            error: None,
        }
    }

    /// A failed response to `request`.
    pub fn failure<E: Into<String>>(request: &Request, error: E) -> Self {
        Self {
            id: request.id.clone(),
            event: request.event.clone(),
            route: request.route.clone(),
            data: empty_object(),
            error: Some(error.into()),
        }
    }

    /// A failure for a frame that never decoded into a request.
    pub fn rejection<E: Into<String>>(error: E) -> Self {
        Self {
            id: None,
            event: String::new(),
            route: String::new(),
            data: empty_object(),
            error: Some(error.into()),
        }
    }

    /// Whether the response reports success.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_defaults_apply() {
        let request: Request =
            serde_json::from_value(json!({"route": "echo", "event": "ping"})).unwrap();
        assert_eq!(request.id, None);
        assert_eq!(request.data, json!({}));
    }

    #[test]
    fn request_id_accepts_int_and_string() {
        let a: Request =
            serde_json::from_value(json!({"id": 7, "route": "r", "event": "e"})).unwrap();
        let b: Request =
            serde_json::from_value(json!({"id": "05.08.2024", "route": "r", "event": "e"}))
                .unwrap();
        assert_eq!(a.id, Some(json!(7)));
        assert_eq!(b.id, Some(json!("05.08.2024")));
    }

    #[test]
    fn success_echoes_correlation_id() {
        let request = Request::new("echo", "ping").with_id(1234567890i64);
        let response = Response::success(&request, json!({"data": "Pong"}));
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(
            wire,
            json!({
                "id": 1234567890i64,
                "event": "ping",
                "route": "echo",
                "data": {"data": "Pong"},
                "error": null
            })
        );
    }

    #[test]
    fn failure_carries_error_text() {
        let request = Request::new("echo", "boom");
        let response = Response::failure(&request, "handler error: nope");
        assert!(!response.is_success());
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["error"], json!("handler error: nope"));
        assert_eq!(wire["data"], json!({}));
    }
}
