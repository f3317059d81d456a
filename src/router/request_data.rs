//! [`ReqData`]: the immutable envelope handed down the middleware/handler chain for one request.

use std::collections::HashMap;
use std::sync::Mutex;

use hyper::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::marshal::MarshalError;
use crate::router::response_proxy::ResponseProxy;
use crate::task::Ctx;

/// A task or HTTP handler's decoded input, or the explicit absence of one.
///
/// `None` is the "no input" sentinel: routes registered against it skip `marshal_input`
/// entirely rather than running it against an input type that doesn't exist.
#[derive(Debug, Clone)]
pub enum Input {
    None,
    Value(serde_json::Value),
}

impl Input {
    /// Recovers a concrete input type from a decoded `Value`. Fails if this request carried no
    /// input, or if the value doesn't deserialize as `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MarshalError> {
        match self {
            Input::None => Err(MarshalError::Validation(
                "route declared no input but a typed input was requested".to_string(),
            )),
            Input::Value(value) => serde_json::from_value(value.clone())
                .map_err(|e| MarshalError::Other(anyhow::anyhow!(e))),
        }
    }
}

/// Everything a handler, HTTP middleware, or task middleware needs to process one request.
///
/// `ReqData` is built once per request and shared by reference (via `Arc`) down the whole
/// chain; the only mutable channel back out is `response_proxy`.
pub struct ReqData {
    /// Values captured by dynamic segments in the matched pattern.
    pub params: HashMap<String, String>,
    /// The tail absorbed by a trailing splat segment, if the matched pattern has one.
    pub splat_values: Vec<String>,
    /// The task-memoization scope for this request.
    pub tasks_ctx: Ctx,
    /// The request's decoded input, per the route's `marshal_input` policy.
    pub input: Input,
    /// The original request's method, URI, and headers (the body has already been consumed to
    /// produce `input`).
    pub request_parts: Parts,
    /// The buffer the handler chain writes status/headers/cookies/redirects into.
    pub response_proxy: Mutex<ResponseProxy>,
}

impl ReqData {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, MarshalError> {
        self.input.decode()
    }

    pub fn with_proxy<R>(&self, f: impl FnOnce(&mut ResponseProxy) -> R) -> R {
        let mut proxy = self.response_proxy.lock().unwrap();
        f(&mut proxy)
    }
}
