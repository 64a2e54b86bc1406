//! Transport-neutral inbound HTTP request
//!
//! Transport adapters translate their native request into a [`Request`]
//! before invoking an execution unit. Parameter extraction reads only
//! from this type.

use ouroboros_common::RequestMethod;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Inbound HTTP request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: RequestMethod,
    /// Request path (without query string)
    pub path: String,
    /// Full URL
    pub url: String,
    /// Route parameters (from route matching)
    pub params: Map<String, Value>,
    /// Query string parameters
    pub query: Map<String, Value>,
    /// HTTP headers (lowercase keys)
    pub headers: HashMap<String, String>,
    /// Decoded request body
    pub body: Option<Value>,
    /// Session attached by a session middleware
    pub session: Option<Value>,
    /// Remote address
    pub ip: Option<String>,
}

impl Request {
    pub fn new(method: RequestMethod, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            url: path.clone(),
            path,
            params: Map::new(),
            query: Map::new(),
            headers: HashMap::new(),
            body: None,
            session: None,
            ip: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Add a header; the name is stored lower-cased.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_session(mut self, session: Value) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Get a header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(|s| s.as_str())
    }

    /// Whole body, or one field of it when `key` is given.
    pub fn body_value(&self, key: Option<&str>) -> Value {
        match (key, &self.body) {
            (None, Some(body)) => body.clone(),
            (Some(key), Some(body)) => body.get(key).cloned().unwrap_or(Value::Null),
            (_, None) => Value::Null,
        }
    }

    /// All query parameters, or a single one when `key` is given.
    pub fn query_value(&self, key: Option<&str>) -> Value {
        lookup(&self.query, key)
    }

    /// All route parameters, or a single one when `key` is given.
    pub fn param_value(&self, key: Option<&str>) -> Value {
        lookup(&self.params, key)
    }

    /// All headers as an object, or a single header when `key` is given.
    pub fn header_value(&self, key: Option<&str>) -> Value {
        match key {
            Some(name) => self
                .header(name)
                .map(|v| Value::String(v.to_string()))
                .unwrap_or(Value::Null),
            None => Value::Object(
                self.headers
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }
}

fn lookup(map: &Map<String, Value>, key: Option<&str>) -> Value {
    match key {
        Some(key) => map.get(key).cloned().unwrap_or(Value::Null),
        None => Value::Object(map.clone()),
    }
}
