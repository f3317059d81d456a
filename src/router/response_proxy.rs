//! [`ResponseProxy`]: an append-only buffer for status, headers, cookies, and redirect intent.
//!
//! User code — handlers, HTTP middleware, task middleware, nested loaders — never writes to the
//! real `hyper::Response` directly. It writes to a proxy instead, which the router applies once
//! the chain has finished. This is what makes task-middleware merging possible: each concurrent
//! middleware gets its own proxy, and the router decides which one "wins" after they've all run.

use cookie::Cookie;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, StatusCode};

#[derive(Debug, Clone)]
struct Redirect {
    url: String,
    status: StatusCode,
}

/// A buffered response: nothing here is visible to the client until [`ResponseProxy::apply`]
/// writes it onto a real `hyper::http::response::Builder`.
#[derive(Debug, Clone, Default)]
pub struct ResponseProxy {
    status: Option<StatusCode>,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    redirect: Option<Redirect>,
}

impl ResponseProxy {
    pub fn new() -> Self {
        ResponseProxy::default()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Overwrites any existing value for `name` within this proxy.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Appends a value for `name`, keeping any existing ones.
    pub fn add_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.append(name, value);
    }

    pub fn set_cookie(&mut self, cookie: Cookie<'static>) {
        self.cookies.push(cookie);
    }

    pub fn redirect(&mut self, url: impl Into<String>, status: StatusCode) {
        self.redirect = Some(Redirect {
            url: url.into(),
            status,
        });
        self.status = Some(status);
    }

    pub fn is_error(&self) -> bool {
        self.status.map(|s| s.as_u16() >= 400).unwrap_or(false)
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect.is_some()
    }

    /// Whether this proxy, applied as-is, would stop the handler chain from running (an error
    /// status or a redirect).
    pub fn is_terminal(&self) -> bool {
        self.is_error() || self.is_redirect()
    }

    /// Writes this proxy's buffered state onto a response builder.
    pub fn apply(&self, mut builder: hyper::http::response::Builder) -> hyper::http::response::Builder {
        builder = builder.status(self.status.unwrap_or(StatusCode::OK));
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in self.headers.iter() {
                headers.append(name, value.clone());
            }
        }
        for cookie in &self.cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                builder = builder.header(hyper::header::SET_COOKIE, value);
            }
        }
        if let Some(redirect) = &self.redirect {
            if let Ok(value) = HeaderValue::from_str(&redirect.url) {
                builder = builder.header(hyper::header::LOCATION, value);
            }
        }
        builder
    }

    /// Copies this proxy's headers and cookies onto an already-built response, leaving its
    /// status untouched. Used after a non-terminal task middleware run: its headers (tracing
    /// ids, cache hints) still belong on the response even though it didn't win the status slot.
    pub fn apply_headers_and_cookies(&self, headers: &mut HeaderMap) {
        for (name, value) in self.headers.iter() {
            headers.append(name, value.clone());
        }
        for cookie in &self.cookies {
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                headers.append(hyper::header::SET_COOKIE, value);
            }
        }
    }

    /// Merges a batch of task-middleware proxies under the rules the concurrent middleware
    /// contract promises: the first proxy (in call order) that sets an error status or a
    /// redirect wins that slot permanently; headers and cookies accumulate across every proxy
    /// regardless of which one "won".
    pub fn merge(proxies: Vec<ResponseProxy>) -> ResponseProxy {
        let mut merged = ResponseProxy::new();
        let mut winner_locked = false;
        for proxy in proxies {
            for (name, value) in proxy.headers.iter() {
                merged.headers.append(name.clone(), value.clone());
            }
            merged.cookies.extend(proxy.cookies.iter().cloned());
            if winner_locked {
                continue;
            }
            if proxy.is_terminal() {
                merged.status = proxy.status;
                merged.redirect = proxy.redirect.clone();
                winner_locked = true;
            } else if proxy.status.is_some() {
                merged.status = proxy.status;
            }
        }
        merged
    }
}
