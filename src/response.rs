use crate::types::Headers;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct Response {
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    pub fn header(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_ref())
    }

    /// The `:status` pseudo-header, or `None` if the peer somehow omitted
    /// it or sent a non-numeric value. Never panics on malformed input
    /// (spec.md §7: "the engine never panics on malformed network input").
    pub fn status(&self) -> Option<u16> {
        self.header(":status")?.parse().ok()
    }

    /// The body decoded as UTF-8, replacing invalid sequences (spec.md §1:
    /// the engine is transport, not a content negotiator — callers that
    /// care about charset handle it themselves).
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    #[cfg(feature = "json")]
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}
