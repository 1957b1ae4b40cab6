//! Per-stream mutable state and flow-control mediation (spec.md §4.3).
//!
//! Owned exclusively by the event loop; every mutation routes through
//! [`crate::stream_state::transition`] first.

use crate::error::Http2Error;
use crate::frame::Frame;
use crate::response::Response;
use crate::stream_state::{transition, Direction, FrameKind, StreamState};
use crate::types::{ErrorCode, Headers, StreamId, MAX_WINDOW_SIZE, WINDOW_UPDATE_THRESHOLD};
use bytes::{Bytes, BytesMut};
use derivative::Derivative;
use log::{trace, warn};
use std::collections::VecDeque;
use tokio::sync::oneshot;

pub type CompletionSlot = oneshot::Sender<Result<Response, Http2Error>>;

/// A DATA chunk that could not be sent immediately because flow-control
/// credit was unavailable (spec.md §4.3 "Drain pending").
struct QueuedData {
    data: Bytes,
    end_stream: bool,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Stream {
    pub id: StreamId,
    state: StreamState,
    send_window: i64,
    recv_window: i64,
    initial_recv_window: i64,
    pending_data: VecDeque<QueuedData>,
    pub request_headers: Headers,
    response_headers: Headers,
    response_body: BytesMut,
    error: Option<Http2Error>,
    completion: Option<CompletionSlot>,
    pending_response: Option<Result<Response, Http2Error>>,
    pub method: Option<String>,
    pub path: Option<String>,
}

impl Stream {
    pub fn new(id: StreamId, initial_send_window: i64, initial_recv_window: i64) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            send_window: initial_send_window,
            recv_window: initial_recv_window,
            initial_recv_window,
            pending_data: VecDeque::new(),
            request_headers: Headers::new(),
            response_headers: Headers::new(),
            response_body: BytesMut::new(),
            error: None,
            completion: None,
            pending_response: None,
            method: None,
            path: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn has_pending_data(&self) -> bool {
        !self.pending_data.is_empty()
    }

    /// Associates a newly issued command with this stream's eventual
    /// response. If the stream already finished (the promised-stream case,
    /// spec.md §4.3 "Completion"), the command resolves immediately.
    ///
    /// Calling this twice on the same stream is a programming error
    /// (spec.md §3: "setting it twice is a programming error") — the
    /// engine never does this, since a stream is associated with at most
    /// one command either at creation or at push-promise claim time.
    pub fn associate_with_command(&mut self, tx: CompletionSlot) {
        debug_assert!(self.completion.is_none(), "stream command set twice");
        if let Some(result) = self.pending_response.take() {
            let _ = tx.send(result);
        } else {
            self.completion = Some(tx);
        }
    }

    fn complete(&mut self, result: Result<Response, Http2Error>) {
        match self.completion.take() {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => self.pending_response = Some(result),
        }
    }

    fn finalize_if_newly_closed(&mut self, was_closed: bool) {
        if !self.state.is_closed() || was_closed {
            return;
        }
        let result = match self.error.clone() {
            Some(err) => Err(err),
            None => Ok(Response {
                headers: std::mem::take(&mut self.response_headers),
                body: self.response_body.clone().freeze(),
            }),
        };
        trace!("stream {} closed, completing command", self.id);
        self.complete(result);
    }

    fn apply(&mut self, kind: FrameKind, direction: Direction) -> Result<(), Http2Error> {
        let was_closed = self.is_closed();
        self.state = transition(self.state, kind, direction)?;
        self.finalize_if_newly_closed(was_closed);
        Ok(())
    }

    /// Outbound HEADERS. `headers` are captured for monitoring (spec.md
    /// §4.3: "so the stream can report its own request").
    pub fn send_headers(&mut self, headers: Headers, end_stream: bool) -> Result<Frame, Http2Error> {
        self.request_headers = headers.clone();
        self.apply(FrameKind::Headers { end_stream }, Direction::Outbound)?;
        Ok(Frame::Headers {
            stream_id: self.id,
            end_stream,
            end_headers: true,
            priority: None,
            headers,
        })
    }

    /// Attempts to send a DATA frame. If only part of `data` fits under the
    /// available credit, the frame is split: the leading slice that fits is
    /// sent now (never carrying END_STREAM, since bytes remain), and the
    /// rest is queued as a new front-of-line entry (spec.md §8 testable
    /// property 7: a 65536-byte body against a 65535-byte window emits
    /// exactly 65535 bytes of DATA before blocking).
    pub fn send_data(
        &mut self,
        data: Bytes,
        end_stream: bool,
        connection_window: &mut i64,
    ) -> Result<Option<Frame>, Http2Error> {
        if !self.pending_data.is_empty() {
            self.pending_data.push_back(QueuedData { data, end_stream });
            return Ok(None);
        }
        let available = self.send_window.min(*connection_window).max(0);
        let n = data.len() as i64;
        if available <= 0 {
            self.pending_data.push_back(QueuedData { data, end_stream });
            return Ok(None);
        }
        if available >= n {
            self.apply(FrameKind::Data { end_stream }, Direction::Outbound)?;
            self.send_window -= n;
            *connection_window -= n;
            return Ok(Some(Frame::Data {
                stream_id: self.id,
                end_stream,
                data,
            }));
        }
        let sendable = available as usize;
        let to_send = data.slice(0..sendable);
        let remainder = data.slice(sendable..);
        self.apply(FrameKind::Data { end_stream: false }, Direction::Outbound)?;
        self.send_window -= available;
        *connection_window -= available;
        self.pending_data.push_back(QueuedData { data: remainder, end_stream });
        Ok(Some(Frame::Data {
            stream_id: self.id,
            end_stream: false,
            data: to_send,
        }))
    }

    /// Releases queued DATA in FIFO order while credit allows, splitting the
    /// head entry across frames the same way [`Stream::send_data`] does
    /// when only partial credit is available. Stops once no credit remains.
    pub fn drain_pending(&mut self, connection_window: &mut i64) -> Result<Vec<Frame>, Http2Error> {
        let mut out = Vec::new();
        loop {
            let available = self.send_window.min(*connection_window).max(0);
            if available <= 0 {
                break;
            }
            let Some(front) = self.pending_data.front_mut() else {
                break;
            };
            let n = front.data.len() as i64;
            if available >= n {
                let QueuedData { data, end_stream } = self.pending_data.pop_front().unwrap();
                self.apply(FrameKind::Data { end_stream }, Direction::Outbound)?;
                self.send_window -= n;
                *connection_window -= n;
                out.push(Frame::Data {
                    stream_id: self.id,
                    end_stream,
                    data,
                });
            } else {
                let sendable = available as usize;
                let to_send = front.data.slice(0..sendable);
                front.data = front.data.slice(sendable..);
                self.apply(FrameKind::Data { end_stream: false }, Direction::Outbound)?;
                self.send_window -= available;
                *connection_window -= available;
                out.push(Frame::Data {
                    stream_id: self.id,
                    end_stream: false,
                    data: to_send,
                });
                break;
            }
        }
        Ok(out)
    }

    pub fn send_rst_stream(
        &mut self,
        error_code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<Frame, Http2Error> {
        self.error = Some(Http2Error::stream(error_code, message));
        self.apply(FrameKind::RstStream, Direction::Outbound)?;
        Ok(Frame::RstStream {
            stream_id: self.id,
            error_code,
        })
    }

    /// Inbound DATA. Returns a WINDOW_UPDATE frame to send if the stream's
    /// receive window crossed the replenishment threshold.
    pub fn on_data(&mut self, data: Bytes, end_stream: bool) -> Result<Option<Frame>, Http2Error> {
        self.apply(FrameKind::Data { end_stream }, Direction::Inbound)?;
        self.recv_window -= data.len() as i64;
        self.response_body.extend_from_slice(&data);
        if self.recv_window >= WINDOW_UPDATE_THRESHOLD {
            return Ok(None);
        }
        let diff = self.initial_recv_window - self.recv_window;
        self.recv_window += diff;
        Ok(Some(Frame::WindowUpdate {
            stream_id: self.id,
            increment: diff as u32,
        }))
    }

    /// Inbound HEADERS or PUSH_PROMISE header block. A missing END_HEADERS
    /// aborts the stream: CONTINUATION frames are not implemented (spec.md
    /// §4.3, §1 non-goals).
    pub fn on_headers(
        &mut self,
        headers: Headers,
        end_stream: bool,
        end_headers: bool,
    ) -> Result<(), Http2Error> {
        if !end_headers {
            return Err(Http2Error::stream(
                ErrorCode::RefusedStream,
                "HEADERS frame without END_HEADERS (CONTINUATION is not supported)",
            ));
        }
        self.apply(FrameKind::Headers { end_stream }, Direction::Inbound)?;
        self.response_headers.extend(headers);
        Ok(())
    }

    /// Inbound PUSH_PROMISE targeting this (freshly allocated, idle)
    /// promised stream.
    pub fn on_push_promise(&mut self, headers: Headers, end_headers: bool) -> Result<(), Http2Error> {
        if !end_headers {
            return Err(Http2Error::stream(
                ErrorCode::RefusedStream,
                "PUSH_PROMISE frame without END_HEADERS (CONTINUATION is not supported)",
            ));
        }
        self.apply(FrameKind::PushPromise, Direction::Inbound)?;
        self.method = headers
            .iter()
            .find(|(k, _)| k == ":method")
            .map(|(_, v)| v.clone());
        self.path = headers
            .iter()
            .find(|(k, _)| k == ":path")
            .map(|(_, v)| v.clone());
        self.request_headers = headers;
        Ok(())
    }

    pub fn on_rst_stream(&mut self, error_code: ErrorCode) -> Result<(), Http2Error> {
        let message = if error_code == ErrorCode::NoError {
            "stream reset with NO_ERROR".to_owned()
        } else {
            format!("stream reset: {}", error_code.name())
        };
        warn!("stream {} reset by peer: {}", self.id, message);
        self.error = Some(Http2Error::stream(error_code, message));
        self.apply(FrameKind::RstStream, Direction::Inbound)?;
        Ok(())
    }

    /// spec.md §3 invariant: `send_window` "MUST NOT exceed 2^31 - 1", so a
    /// peer that sends oversized WINDOW_UPDATEs on one stream can't push it
    /// past that ceiling, mirroring the clamp [`Stream::adjust_send_window`]
    /// already applies and the connection-level window's own clamp on
    /// receipt of a connection-scoped WINDOW_UPDATE.
    pub fn on_window_update(&mut self, increment: u32) {
        self.send_window = (self.send_window + i64::from(increment)).min(MAX_WINDOW_SIZE);
    }

    /// Rebalances `send_window` by a signed delta when the peer's
    /// SETTINGS_INITIAL_WINDOW_SIZE changes mid-connection (spec.md §9:
    /// "re-balance every stream's send_window by the delta").
    pub fn adjust_send_window(&mut self, delta: i64) {
        self.send_window = (self.send_window + delta).min(MAX_WINDOW_SIZE);
    }

    pub fn on_priority(&self) {
        trace!("stream {} received PRIORITY (ignored)", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_completes_with_promised_completion_slot() {
        let mut stream = Stream::new(1, 65_535, 65_535);
        let frame = stream.send_headers(vec![(":method".into(), "GET".into())], true);
        assert!(frame.is_ok());
        assert_eq!(stream.state(), StreamState::HalfClosedLocal);

        stream
            .on_headers(vec![(":status".into(), "200".into())], false, true)
            .unwrap();
        stream.on_data(Bytes::from_static(b"hi"), true).unwrap();
        assert!(stream.is_closed());

        let (tx, rx) = oneshot::channel();
        stream.associate_with_command(tx);
        let response = rx.try_recv().unwrap().unwrap();
        assert_eq!(response.body, Bytes::from_static(b"hi"));
    }

    #[test]
    fn post_queues_data_when_window_exhausted() {
        let mut stream = Stream::new(1, 10, 10);
        stream.send_headers(vec![], false).unwrap();
        let mut connection_window = 100i64;
        let sent = stream
            .send_data(Bytes::from(vec![0u8; 10]), false, &mut connection_window)
            .unwrap();
        assert!(sent.is_some());
        let queued = stream
            .send_data(Bytes::from(vec![0u8; 5]), true, &mut connection_window)
            .unwrap();
        assert!(queued.is_none());
        assert!(stream.has_pending_data());

        stream.on_window_update(5);
        let drained = stream.drain_pending(&mut connection_window).unwrap();
        assert_eq!(drained.len(), 1);
        assert!(!stream.has_pending_data());
    }

    /// spec.md §8 testable property 7: a 65536-byte body against the
    /// default 65535-byte window emits exactly 65535 bytes of DATA, then
    /// blocks; a 1-byte WINDOW_UPDATE at both stream and connection scope
    /// releases the remaining byte.
    #[test]
    fn flow_control_sends_exactly_initial_window_then_drains_remainder() {
        let mut stream = Stream::new(1, 65_535, 65_535);
        stream.send_headers(vec![], false).unwrap();
        let mut connection_window = 65_535i64;

        let body = Bytes::from(vec![0u8; 65_536]);
        let sent = stream
            .send_data(body, true, &mut connection_window)
            .unwrap()
            .expect("partial frame sent");
        let (Frame::Data { data, end_stream, .. }) = sent else {
            panic!("expected a DATA frame");
        };
        assert_eq!(data.len(), 65_535);
        assert!(!end_stream);
        assert!(stream.has_pending_data());
        assert_eq!(connection_window, 0);

        stream.on_window_update(1);
        connection_window += 1;
        let drained = stream.drain_pending(&mut connection_window).unwrap();
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Frame::Data { data, end_stream, .. } => {
                assert_eq!(data.len(), 1);
                assert!(*end_stream);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!stream.has_pending_data());
        assert!(stream.is_closed());
    }

    /// spec.md §3 invariant: `send_window` must never exceed 2^31 - 1, even
    /// when the peer sends WINDOW_UPDATEs large enough to overflow it.
    #[test]
    fn on_window_update_clamps_to_max_window_size() {
        let mut stream = Stream::new(1, MAX_WINDOW_SIZE - 1, 65_535);
        stream.on_window_update(u32::MAX);
        stream.on_window_update(u32::MAX);
        assert_eq!(stream.send_window, MAX_WINDOW_SIZE);
    }

    #[test]
    fn inbound_data_emits_window_update_past_threshold() {
        let mut stream = Stream::new(1, 65_535, 65_535);
        stream.send_headers(vec![], true).unwrap();
        let big = Bytes::from(vec![0u8; 60_000]);
        let update = stream.on_data(big, false).unwrap();
        assert!(update.is_some());
        match update.unwrap() {
            Frame::WindowUpdate { increment, .. } => assert_eq!(increment, 60_000),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rst_stream_records_error_and_closes() {
        let mut stream = Stream::new(1, 65_535, 65_535);
        stream.send_headers(vec![], true).unwrap();
        stream.on_rst_stream(ErrorCode::RefusedStream).unwrap();
        assert!(stream.is_closed());
        let (tx, rx) = oneshot::channel();
        stream.associate_with_command(tx);
        let result = rx.try_recv().unwrap();
        assert!(result.is_err());
    }
}
