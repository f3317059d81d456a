//! Input decoding: the single policy point translating an HTTP request into a task/handler's
//! typed input.
//!
//! A router is configured with exactly one [`MarshalInputFn`]; there is no per-route override.
//! The default policy decodes `GET`/`HEAD` requests from the query string and everything else
//! from a JSON body, but applications are free to supply their own (enforcing a schema,
//! rejecting unsupported content types, reading headers) since the router only ever calls
//! through the trait object.

use std::collections::HashMap;
use std::sync::Arc;

use hyper::http::request::Parts;
use hyper::Method;
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Why `marshal_input` rejected a request.
///
/// The split exists purely so the router can pick a status code: `Validation` becomes 400,
/// `Other` becomes 500.
#[derive(Debug, Error)]
pub enum MarshalError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A user-supplied input decoder, shared across every route on a [`crate::router::Router`].
pub type MarshalInputFn =
    Arc<dyn Fn(&Parts, &[u8]) -> Result<serde_json::Value, MarshalError> + Send + Sync>;

/// Decodes `GET`/`HEAD` requests from their query string (as a flat string-to-string JSON
/// object) and every other method from a JSON body. An empty body on a non-`GET` request decodes
/// as JSON `null` rather than a validation error, matching the "no input" sentinel's contract.
pub fn default_marshal_input(parts: &Parts, body: &[u8]) -> Result<serde_json::Value, MarshalError> {
    if parts.method == Method::GET || parts.method == Method::HEAD {
        let query = parts.uri.query().unwrap_or("");
        Ok(serde_json::Value::Object(parse_query_string(query).into_iter().collect()))
    } else if body.is_empty() {
        Ok(serde_json::Value::Null)
    } else {
        serde_json::from_slice(body)
            .map_err(|e| MarshalError::Validation(format!("invalid JSON body: {}", e)))
    }
}

fn parse_query_string(query: &str) -> HashMap<String, serde_json::Value> {
    let mut map = HashMap::new();
    if query.is_empty() {
        return map;
    }
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, '=');
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("");
        let key = percent_decode_str(key).decode_utf8_lossy().replace('+', " ");
        let value = percent_decode_str(value).decode_utf8_lossy().replace('+', " ");
        map.insert(key, serde_json::Value::String(value));
    }
    map
}
