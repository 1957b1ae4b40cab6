//! Frame codec (spec.md §4.1): pure functions from bytes to [`Frame`] and
//! back. Reading the 9-byte header and payload off the wire is split from
//! HPACK decompression so that only the event loop ever touches the shared
//! HPACK contexts (spec.md §5: "The HPACK contexts have a single mutator").

use crate::error::Http2Error;
use crate::flags::{DataFlags, HeadersFlags, PingFlags, PushPromiseFlags, SettingsFlags};
use crate::hpack::{HpackDecoder, HpackEncoder};
use crate::types::{ErrorCode, FrameType, Headers, SettingsParameter, StreamId};
use bytes::{BufMut, Bytes, BytesMut};
use num_traits::{FromPrimitive, ToPrimitive};
use tokio::io::{AsyncRead, AsyncReadExt};

pub const FRAME_HEADER_LEN: usize = 9;

/// Stream dependency and weight carried by the PRIORITY flag or frame
/// (spec.md §4.1: "priority info is recorded but otherwise unused").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub exclusive: bool,
    pub stream_dependency: StreamId,
    pub weight: u8,
}

/// A frame with its header already parsed but its payload left as raw
/// bytes. Produced by the reader task, consumed by [`decode`] in the event
/// loop.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: StreamId,
    pub payload: Bytes,
}

impl RawFrame {
    /// Reads one frame header and payload from `reader`. Blocks until a full
    /// frame is available or the connection is closed.
    pub async fn read(reader: &mut (impl AsyncRead + Unpin)) -> Result<Self, Http2Error> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        reader.read_exact(&mut header).await?;
        let length = u32::from_be_bytes([0, header[0], header[1], header[2]]) as usize;
        let frame_type = header[3];
        let flags = header[4];
        let stream_id = u32::from_be_bytes([header[5], header[6], header[7], header[8]])
            & 0x7fff_ffff;
        let mut payload = vec![0u8; length];
        reader.read_exact(&mut payload).await?;
        Ok(Self {
            frame_type,
            flags,
            stream_id,
            payload: Bytes::from(payload),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: StreamId,
        end_stream: bool,
        data: Bytes,
    },
    Headers {
        stream_id: StreamId,
        end_stream: bool,
        end_headers: bool,
        priority: Option<Priority>,
        headers: Headers,
    },
    Priority {
        stream_id: StreamId,
        priority: Priority,
    },
    RstStream {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    Settings {
        ack: bool,
        params: Vec<(SettingsParameter, u32)>,
    },
    PushPromise {
        stream_id: StreamId,
        promised_stream_id: StreamId,
        end_headers: bool,
        headers: Headers,
    },
    Ping {
        ack: bool,
        payload: [u8; 8],
    },
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    WindowUpdate {
        stream_id: StreamId,
        increment: u32,
    },
}

impl Frame {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
        }
    }
}

/// Strips the PADDED prelude/suffix, if present, returning the cleaned body.
fn unpad(payload: &[u8], padded: bool) -> Result<&[u8], Http2Error> {
    if !padded {
        return Ok(payload);
    }
    let pad_len = *payload
        .first()
        .ok_or_else(|| frame_size_error("PADDED flag set on an empty payload"))? as usize;
    let body = &payload[1..];
    if pad_len > body.len() {
        return Err(frame_size_error("pad length exceeds payload size"));
    }
    Ok(&body[..body.len() - pad_len])
}

fn read_priority(body: &[u8]) -> Result<(Priority, &[u8]), Http2Error> {
    if body.len() < 5 {
        return Err(frame_size_error("truncated priority prelude"));
    }
    let raw = u32::from_be_bytes([body[0], body[1], body[2], body[3]]);
    let priority = Priority {
        exclusive: raw & 0x8000_0000 != 0,
        stream_dependency: raw & 0x7fff_ffff,
        weight: body[4],
    };
    Ok((priority, &body[5..]))
}

fn frame_size_error(message: impl Into<String>) -> Http2Error {
    Http2Error::protocol(ErrorCode::FrameSizeError, message)
}

/// Decompresses a HEADERS/PUSH_PROMISE body and decodes it into [`Frame`].
/// HEADERS and PUSH_PROMISE without END_HEADERS are rejected up front:
/// CONTINUATION frames are a non-goal (spec.md §1), so a header block split
/// across frames cannot be completed.
pub fn decode(raw: RawFrame, hpack: &mut HpackDecoder) -> Result<Frame, Http2Error> {
    let frame_type = FrameType::from_u8(raw.frame_type).ok_or_else(|| {
        Http2Error::protocol(
            ErrorCode::ProtocolError,
            format!("unknown frame type {:#x}", raw.frame_type),
        )
    })?;

    match frame_type {
        FrameType::Data => {
            let flags = DataFlags::from_bits_truncate(raw.flags);
            let data = unpad(&raw.payload, flags.contains(DataFlags::PADDED))?;
            Ok(Frame::Data {
                stream_id: raw.stream_id,
                end_stream: flags.contains(DataFlags::END_STREAM),
                data: Bytes::copy_from_slice(data),
            })
        }

        FrameType::Headers => {
            let flags = HeadersFlags::from_bits_truncate(raw.flags);
            let body = unpad(&raw.payload, flags.contains(HeadersFlags::PADDED))?;
            let (priority, block) = if flags.contains(HeadersFlags::PRIORITY) {
                let (priority, rest) = read_priority(body)?;
                (Some(priority), rest)
            } else {
                (None, body)
            };
            let headers = hpack.decode(block)?;
            Ok(Frame::Headers {
                stream_id: raw.stream_id,
                end_stream: flags.contains(HeadersFlags::END_STREAM),
                end_headers: flags.contains(HeadersFlags::END_HEADERS),
                priority,
                headers,
            })
        }

        FrameType::Priority => {
            let (priority, _) = read_priority(&raw.payload)?;
            Ok(Frame::Priority {
                stream_id: raw.stream_id,
                priority,
            })
        }

        FrameType::RstStream => {
            if raw.payload.len() != 4 {
                return Err(frame_size_error("RST_STREAM payload must be 4 bytes"));
            }
            let code = u32::from_be_bytes(raw.payload[..4].try_into().unwrap());
            Ok(Frame::RstStream {
                stream_id: raw.stream_id,
                error_code: error_code_from_u32(code),
            })
        }

        FrameType::Settings => {
            let flags = SettingsFlags::from_bits_truncate(raw.flags);
            let ack = flags.contains(SettingsFlags::ACK);
            if ack {
                if !raw.payload.is_empty() {
                    return Err(frame_size_error("SETTINGS ACK must have an empty payload"));
                }
                return Ok(Frame::Settings {
                    ack: true,
                    params: Vec::new(),
                });
            }
            if raw.payload.len() % 6 != 0 {
                return Err(frame_size_error(
                    "SETTINGS payload length must be a multiple of 6",
                ));
            }
            let mut params = Vec::with_capacity(raw.payload.len() / 6);
            for chunk in raw.payload.chunks(6) {
                let id = u16::from_be_bytes([chunk[0], chunk[1]]);
                let value = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
                let param = SettingsParameter::from_u16(id).ok_or_else(|| {
                    Http2Error::protocol(
                        ErrorCode::ProtocolError,
                        format!("unknown SETTINGS identifier {id:#x}"),
                    )
                })?;
                params.push((param, value));
            }
            Ok(Frame::Settings { ack: false, params })
        }

        FrameType::PushPromise => {
            let flags = PushPromiseFlags::from_bits_truncate(raw.flags);
            let body = unpad(&raw.payload, flags.contains(PushPromiseFlags::PADDED))?;
            if body.len() < 4 {
                return Err(frame_size_error("truncated PUSH_PROMISE payload"));
            }
            let promised_stream_id =
                u32::from_be_bytes([body[0], body[1], body[2], body[3]]) & 0x7fff_ffff;
            let headers = hpack.decode(&body[4..])?;
            Ok(Frame::PushPromise {
                stream_id: raw.stream_id,
                promised_stream_id,
                end_headers: flags.contains(PushPromiseFlags::END_HEADERS),
                headers,
            })
        }

        FrameType::Ping => {
            let flags = PingFlags::from_bits_truncate(raw.flags);
            if raw.payload.len() != 8 {
                return Err(frame_size_error("PING payload must be 8 bytes"));
            }
            let mut payload = [0u8; 8];
            payload.copy_from_slice(&raw.payload);
            Ok(Frame::Ping {
                ack: flags.contains(PingFlags::ACK),
                payload,
            })
        }

        FrameType::GoAway => {
            if raw.payload.len() < 8 {
                return Err(frame_size_error("GOAWAY payload must be at least 8 bytes"));
            }
            let last_stream_id =
                u32::from_be_bytes(raw.payload[0..4].try_into().unwrap()) & 0x7fff_ffff;
            let code = u32::from_be_bytes(raw.payload[4..8].try_into().unwrap());
            Ok(Frame::GoAway {
                last_stream_id,
                error_code: error_code_from_u32(code),
                debug_data: raw.payload.slice(8..),
            })
        }

        FrameType::WindowUpdate => {
            if raw.payload.len() != 4 {
                return Err(frame_size_error("WINDOW_UPDATE payload must be 4 bytes"));
            }
            let increment =
                u32::from_be_bytes(raw.payload[..4].try_into().unwrap()) & 0x7fff_ffff;
            Ok(Frame::WindowUpdate {
                stream_id: raw.stream_id,
                increment,
            })
        }
    }
}

fn error_code_from_u32(code: u32) -> ErrorCode {
    ErrorCode::from_u32(code).unwrap_or(ErrorCode::InternalError)
}

fn write_header(out: &mut BytesMut, length: usize, frame_type: FrameType, flags: u8, stream_id: StreamId) {
    out.put_u8((length >> 16) as u8);
    out.put_u8((length >> 8) as u8);
    out.put_u8(length as u8);
    out.put_u8(frame_type.to_u8().expect("FrameType is repr(u8)"));
    out.put_u8(flags);
    out.put_u32(stream_id & 0x7fff_ffff);
}

/// Encodes `frame` into a complete wire-ready buffer, mutating `hpack`'s
/// dynamic table for HEADERS/PUSH_PROMISE (spec.md §4.1).
pub fn encode(frame: &Frame, hpack: &mut HpackEncoder) -> BytesMut {
    let mut out = BytesMut::new();
    match frame {
        Frame::Data {
            stream_id,
            end_stream,
            data,
        } => {
            let flags = if *end_stream {
                DataFlags::END_STREAM.bits()
            } else {
                0
            };
            write_header(&mut out, data.len(), FrameType::Data, flags, *stream_id);
            out.extend_from_slice(data);
        }

        Frame::Headers {
            stream_id,
            end_stream,
            end_headers,
            priority,
            headers,
        } => {
            let mut flags = HeadersFlags::empty();
            if *end_stream {
                flags |= HeadersFlags::END_STREAM;
            }
            if *end_headers {
                flags |= HeadersFlags::END_HEADERS;
            }
            let mut payload = BytesMut::new();
            if let Some(p) = priority {
                flags |= HeadersFlags::PRIORITY;
                let raw = (if p.exclusive { 0x8000_0000 } else { 0 }) | (p.stream_dependency & 0x7fff_ffff);
                payload.put_u32(raw);
                payload.put_u8(p.weight);
            }
            payload.extend_from_slice(&hpack.encode(headers));
            write_header(&mut out, payload.len(), FrameType::Headers, flags.bits(), *stream_id);
            out.extend_from_slice(&payload);
        }

        Frame::Priority {
            stream_id,
            priority,
        } => {
            let mut payload = BytesMut::with_capacity(5);
            let raw = (if priority.exclusive { 0x8000_0000 } else { 0 })
                | (priority.stream_dependency & 0x7fff_ffff);
            payload.put_u32(raw);
            payload.put_u8(priority.weight);
            write_header(&mut out, payload.len(), FrameType::Priority, 0, *stream_id);
            out.extend_from_slice(&payload);
        }

        Frame::RstStream {
            stream_id,
            error_code,
        } => {
            write_header(&mut out, 4, FrameType::RstStream, 0, *stream_id);
            out.put_u32(error_code.to_u32().expect("ErrorCode is repr(u32)"));
        }

        Frame::Settings { ack, params } => {
            let flags = if *ack { SettingsFlags::ACK.bits() } else { 0 };
            let length = params.len() * 6;
            write_header(&mut out, length, FrameType::Settings, flags, 0);
            for (param, value) in params {
                out.put_u16(param.to_u16().expect("SettingsParameter is repr(u16)"));
                out.put_u32(*value);
            }
        }

        Frame::PushPromise {
            stream_id,
            promised_stream_id,
            end_headers,
            headers,
        } => {
            let flags = if *end_headers {
                PushPromiseFlags::END_HEADERS.bits()
            } else {
                0
            };
            let mut payload = BytesMut::new();
            payload.put_u32(promised_stream_id & 0x7fff_ffff);
            payload.extend_from_slice(&hpack.encode(headers));
            write_header(&mut out, payload.len(), FrameType::PushPromise, flags, *stream_id);
            out.extend_from_slice(&payload);
        }

        Frame::Ping { ack, payload } => {
            let flags = if *ack { PingFlags::ACK.bits() } else { 0 };
            write_header(&mut out, 8, FrameType::Ping, flags, 0);
            out.extend_from_slice(payload);
        }

        Frame::GoAway {
            last_stream_id,
            error_code,
            debug_data,
        } => {
            write_header(
                &mut out,
                8 + debug_data.len(),
                FrameType::GoAway,
                0,
                0,
            );
            out.put_u32(last_stream_id & 0x7fff_ffff);
            out.put_u32(error_code.to_u32().expect("ErrorCode is repr(u32)"));
            out.extend_from_slice(debug_data);
        }

        Frame::WindowUpdate {
            stream_id,
            increment,
        } => {
            write_header(&mut out, 4, FrameType::WindowUpdate, 0, *stream_id);
            out.put_u32(increment & 0x7fff_ffff);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SettingsParameter;

    fn round_trip(frame: Frame) -> Frame {
        let mut enc = HpackEncoder::new();
        let mut dec = HpackDecoder::new();
        let bytes = encode(&frame, &mut enc);
        let raw = RawFrame {
            frame_type: bytes[3],
            flags: bytes[4],
            stream_id: u32::from_be_bytes(bytes[5..9].try_into().unwrap()),
            payload: Bytes::copy_from_slice(&bytes[9..]),
        };
        decode(raw, &mut dec).unwrap()
    }

    #[test]
    fn data_round_trips() {
        let frame = Frame::Data {
            stream_id: 3,
            end_stream: true,
            data: Bytes::from_static(b"hello"),
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn headers_round_trips() {
        let frame = Frame::Headers {
            stream_id: 1,
            end_stream: true,
            end_headers: true,
            priority: None,
            headers: vec![
                (":method".into(), "GET".into()),
                (":path".into(), "/".into()),
            ],
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn headers_with_padding_decodes_to_the_same_headers() {
        let headers: Headers = vec![(":method".into(), "GET".into())];
        let mut enc = HpackEncoder::new();
        let block = enc.encode(&headers);
        let mut payload = BytesMut::new();
        payload.put_u8(10);
        payload.extend_from_slice(&block);
        payload.extend_from_slice(&[0u8; 10]);
        let raw = RawFrame {
            frame_type: FrameType::Headers.to_u8().unwrap(),
            flags: (HeadersFlags::END_HEADERS | HeadersFlags::PADDED).bits(),
            stream_id: 1,
            payload: payload.freeze(),
        };
        let mut dec = HpackDecoder::new();
        let frame = decode(raw, &mut dec).unwrap();
        match frame {
            Frame::Headers { headers: h, .. } => assert_eq!(h, headers),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn headers_with_priority_prelude_is_skipped() {
        let headers: Headers = vec![(":method".into(), "GET".into())];
        let mut enc = HpackEncoder::new();
        let block = enc.encode(&headers);
        let mut payload = BytesMut::new();
        payload.put_u32(5);
        payload.put_u8(16);
        payload.extend_from_slice(&block);
        let raw = RawFrame {
            frame_type: FrameType::Headers.to_u8().unwrap(),
            flags: (HeadersFlags::END_HEADERS | HeadersFlags::PRIORITY).bits(),
            stream_id: 1,
            payload: payload.freeze(),
        };
        let mut dec = HpackDecoder::new();
        let frame = decode(raw, &mut dec).unwrap();
        match frame {
            Frame::Headers {
                headers: h,
                priority: Some(p),
                ..
            } => {
                assert_eq!(h, headers);
                assert_eq!(p.stream_dependency, 5);
                assert_eq!(p.weight, 16);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn settings_round_trips() {
        let frame = Frame::Settings {
            ack: false,
            params: vec![
                (SettingsParameter::InitialWindowSize, 65_535),
                (SettingsParameter::MaxFrameSize, 16_384),
            ],
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn settings_ack_has_no_payload() {
        let frame = Frame::Settings {
            ack: true,
            params: Vec::new(),
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn settings_rejects_unknown_identifier() {
        let raw = RawFrame {
            frame_type: FrameType::Settings.to_u8().unwrap(),
            flags: 0,
            stream_id: 0,
            payload: {
                let mut p = BytesMut::new();
                p.put_u16(0xff);
                p.put_u32(1);
                p.freeze()
            },
        };
        let mut dec = HpackDecoder::new();
        assert!(decode(raw, &mut dec).is_err());
    }

    #[test]
    fn ping_round_trips() {
        let frame = Frame::Ping {
            ack: true,
            payload: [1, 2, 3, 4, 5, 6, 7, 8],
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn ping_rejects_wrong_length() {
        let raw = RawFrame {
            frame_type: FrameType::Ping.to_u8().unwrap(),
            flags: 0,
            stream_id: 0,
            payload: Bytes::from_static(b"short"),
        };
        let mut dec = HpackDecoder::new();
        assert!(decode(raw, &mut dec).is_err());
    }

    #[test]
    fn window_update_round_trips() {
        let frame = Frame::WindowUpdate {
            stream_id: 5,
            increment: 100,
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn goaway_round_trips_with_debug_data() {
        let frame = Frame::GoAway {
            last_stream_id: 7,
            error_code: ErrorCode::ProtocolError,
            debug_data: Bytes::from_static(b"oops"),
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn rst_stream_round_trips() {
        let frame = Frame::RstStream {
            stream_id: 9,
            error_code: ErrorCode::RefusedStream,
        };
        assert_eq!(round_trip(frame.clone()), frame);
    }

    #[test]
    fn unknown_frame_type_is_an_error() {
        let raw = RawFrame {
            frame_type: 0xff,
            flags: 0,
            stream_id: 0,
            payload: Bytes::new(),
        };
        let mut dec = HpackDecoder::new();
        assert!(decode(raw, &mut dec).is_err());
    }
}
