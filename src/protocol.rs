//! Wire protocol: newline-delimited JSON over the session socket.
//!
//! One request line, one response line, UTF-8. Request params are carried
//! flattened next to `action`; `_flags` carries launch-time flags the client
//! wants the daemon to absorb.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub action: String,
    #[serde(default, rename = "_flags")]
    pub flags: Map<String, Value>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, String> {
        serde_json::from_str(line).map_err(|e| format!("Parse error: {}", e))
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn required_str(&self, key: &str) -> Result<&str, String> {
        self.str_param(key)
            .ok_or_else(|| format!("Missing required parameter '{}'", key))
    }

    pub fn bool_param(&self, key: &str) -> bool {
        self.params
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn i64_param(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(|v| v.as_i64())
    }

    pub fn f64_param(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// The reserved shutdown marker: set on the `close` response, observed by
    /// the serve loop after the reply is flushed.
    pub fn wants_shutdown(&self) -> bool {
        self.data
            .as_ref()
            .and_then(|d| d.get("shutdown"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"success":false,"error":"response serialization failed"}"#.to_string()
        });
        line.push('\n');
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parse_flattens_params() {
        let req = Request::parse(r#"{"action":"click","selector":"@e3"}"#).unwrap();
        assert_eq!(req.action, "click");
        assert_eq!(req.str_param("selector"), Some("@e3"));
        assert!(req.flags.is_empty());
    }

    #[test]
    fn test_request_parse_extracts_flags() {
        let req =
            Request::parse(r#"{"action":"navigate","url":"https://x.dev","_flags":{"proxy":"http://p:1"}}"#)
                .unwrap();
        assert_eq!(req.flags.get("proxy").unwrap(), "http://p:1");
        assert!(!req.params.contains_key("_flags"));
    }

    #[test]
    fn test_request_parse_rejects_missing_action() {
        assert!(Request::parse(r#"{"url":"https://x.dev"}"#).is_err());
        assert!(Request::parse("not json").is_err());
    }

    #[test]
    fn test_response_round_trip_is_single_line() {
        let resp = Response::ok(json!({"url": "https://example.com/", "title": "Example\nDomain"}));
        let line = resp.to_line();
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.ends_with('\n'));
        let back: Response = serde_json::from_str(line.trim()).unwrap();
        assert!(back.success);
    }

    #[test]
    fn test_shutdown_marker() {
        let resp = Response::ok(json!({"closed": true, "shutdown": true}));
        assert!(resp.wants_shutdown());
        assert!(!Response::ok(json!({"closed": true})).wants_shutdown());
        assert!(!Response::err("boom").wants_shutdown());
    }
}
