//! HTTP surface types: request metadata, decoded payloads and responses.
//!
//! A `Request` carries the method, raw path and headers of one incoming call.
//! The body is decoded separately into a `Payload`: JSON is tried first and
//! URL-encoded form fields are the fallback, so handlers always see a
//! structured value.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// HTTP request methods understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    Head,
}

impl Method {
    /// Parse a method name, case-insensitively. Unknown methods yield `None`.
    pub fn parse(s: &str) -> Option<Method> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            "OPTIONS" => Some(Method::Options),
            "HEAD" => Some(Method::Head),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered header map. Header names keep their registration casing; lookups
/// are case-insensitive.
pub type Headers = IndexMap<String, String>;

/// Per-request metadata, constructed once from the transport layer.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Raw request path, including any query string.
    pub path: String,
    pub headers: Headers,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>, headers: Headers) -> Self {
        Self {
            method,
            path: path.into(),
            headers,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Decoded request body: JSON first, form-encoded fields as fallback.
#[derive(Debug, Clone)]
pub struct Payload(pub Value);

impl Payload {
    /// Decode a request body. An unparseable (or empty) JSON body falls back
    /// to `application/x-www-form-urlencoded` fields; if nothing decodes the
    /// payload is an empty object.
    pub fn parse(body: &str) -> Payload {
        if body.is_empty() {
            return Payload(Value::Object(serde_json::Map::new()));
        }
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Payload(value),
            Err(_) => Payload(form_fields_to_value(body)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String view of a field, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// Parse a query string (or form body) into an ordered map.
/// `+` is treated as a space and percent-escapes are decoded.
pub fn parse_query_string(query: &str) -> IndexMap<String, String> {
    let mut result = IndexMap::new();
    if query.is_empty() {
        return result;
    }

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            let decoded_key = urlencoding::decode(&key.replace('+', " "))
                .unwrap_or_else(|_| key.into())
                .into_owned();
            let decoded_value = urlencoding::decode(&value.replace('+', " "))
                .unwrap_or_else(|_| value.into())
                .into_owned();
            result.insert(decoded_key, decoded_value);
        } else {
            let decoded = urlencoding::decode(&pair.replace('+', " "))
                .unwrap_or_else(|_| pair.into())
                .into_owned();
            result.insert(decoded, String::new());
        }
    }

    result
}

fn form_fields_to_value(body: &str) -> Value {
    let mut map = serde_json::Map::new();
    for (k, v) in parse_query_string(body) {
        map.insert(k, Value::String(v));
    }
    Value::Object(map)
}

/// An outgoing response: status, headers and a rendered body.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// Raw string passthrough with status 200.
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// Serialize a structured value and set `Content-Type: application/json`.
    pub fn json(data: &Value, status: u16) -> Self {
        let body = serde_json::to_string(data).unwrap_or_else(|_| "null".to_string());
        Self::new(status, body).with_header("Content-Type", "application/json")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// The terminal no-match response.
    pub fn not_found() -> Self {
        Self::json(&serde_json::json!({"error": "404 Not Found"}), 404)
    }

    /// Generic response for unresolvable dispatch configurations.
    pub fn server_error() -> Self {
        Self::json(&serde_json::json!({"error": "500 Internal Server Error"}), 500)
    }
}
