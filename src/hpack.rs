//! Thin wrapper around the external `hpack` crate.
//!
//! HPACK's dynamic table is stateful and shared across every HEADERS/
//! PUSH_PROMISE frame on a connection (spec.md §3), so these wrappers are
//! not `Clone` and are owned exclusively by the Connection Engine — the
//! single mutator required by spec.md §5.

use crate::error::Http2Error;
use crate::types::{ErrorCode, Headers};
use bytes::Bytes;

pub struct HpackEncoder {
    inner: hpack::Encoder<'static>,
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: hpack::Encoder::new(),
        }
    }

    /// Encodes `headers` into a header-block fragment, mutating the shared
    /// dynamic table (spec.md §4.1 "the HPACK encoder state is mutated").
    pub fn encode(&mut self, headers: &Headers) -> Bytes {
        let encoded = self
            .inner
            .encode(headers.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())));
        Bytes::from(encoded)
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HpackDecoder {
    inner: hpack::Decoder<'static>,
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: hpack::Decoder::new(),
        }
    }

    /// Decompresses a header-block fragment. A decode error here is a
    /// connection-level COMPRESSION_ERROR (spec.md §4.1).
    pub fn decode(&mut self, block: &[u8]) -> Result<Headers, Http2Error> {
        let mut headers = Headers::new();
        self.inner
            .decode_with_cb(block, |name, value| {
                headers.push((
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                ));
            })
            .map_err(|err| {
                Http2Error::protocol(
                    ErrorCode::CompressionError,
                    format!("HPACK decode error: {err:?}"),
                )
            })?;
        Ok(headers)
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_header_list() {
        let mut encoder = HpackEncoder::new();
        let mut decoder = HpackDecoder::new();
        let headers: Headers = vec![
            (":method".to_owned(), "GET".to_owned()),
            (":path".to_owned(), "/".to_owned()),
        ];
        let encoded = encoder.encode(&headers);
        let decoded = decoder.decode(&encoded).unwrap();
        assert_eq!(decoded, headers);
    }

    #[test]
    fn dynamic_table_is_shared_across_calls() {
        let mut encoder = HpackEncoder::new();
        let mut decoder = HpackDecoder::new();
        let first: Headers = vec![("custom-header".to_owned(), "custom-value".to_owned())];
        let second: Headers = vec![("custom-header".to_owned(), "custom-value".to_owned())];
        let encoded_first = encoder.encode(&first);
        let encoded_second = encoder.encode(&second);
        assert!(encoded_second.len() <= encoded_first.len());
        assert_eq!(decoder.decode(&encoded_first).unwrap(), first);
        assert_eq!(decoder.decode(&encoded_second).unwrap(), second);
    }

    #[test]
    fn rejects_garbage_as_compression_error() {
        let mut decoder = HpackDecoder::new();
        let err = decoder.decode(&[0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(
            err,
            Http2Error::Protocol(ErrorCode::CompressionError, _)
        ));
    }
}
