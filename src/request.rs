use crate::duration::DEFAULT_COMMAND_TIMEOUT;
use crate::types::Headers;
use bytes::Bytes;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Method {
    #[display(fmt = "GET")]
    Get,
    #[display(fmt = "PUT")]
    Put,
    #[display(fmt = "POST")]
    Post,
}

/// An outbound HTTP request as the user specified it, before the engine
/// adds pseudo-headers (spec.md §4.4 "Outbound HTTP command execution").
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub headers: Headers,
    pub body: Bytes,
    pub timeout: Duration,
    pub include_headers: bool,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Headers::new(),
            body: Bytes::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            include_headers: false,
        }
    }

    #[inline]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    #[inline]
    pub fn put(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    #[inline]
    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    #[cfg(feature = "json")]
    pub fn post_json<T: serde::Serialize>(path: impl Into<String>, value: &T) -> serde_json::Result<Self> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::post(path, body).with_header("content-type", "application/json"))
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((normalize_header_name(&name.into()), value.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn including_headers(mut self) -> Self {
        self.include_headers = true;
        self
    }
}

/// Lowercases a user-supplied header name and strips every trailing colon
/// (users often type `Content-Type:`). Pseudo-headers are never produced
/// this way; only the engine emits those.
pub fn normalize_header_name(name: &str) -> String {
    let mut name = name;
    while name.ends_with(':') {
        name = &name[..name.len() - 1];
    }
    name.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_all_trailing_colons_and_lowercases() {
        assert_eq!(normalize_header_name("Content-Type:"), "content-type");
        assert_eq!(normalize_header_name("X-Foo::"), "x-foo");
        assert_eq!(normalize_header_name("accept"), "accept");
    }
}
