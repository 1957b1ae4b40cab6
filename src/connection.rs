//! The Connection Engine (spec.md §4.4): orchestrates frame dispatch and
//! command execution. All mutable connection state lives here, which is
//! why the event loop (spec.md §4.5, §5) is the only thing allowed to call
//! into it.

use crate::command::{Command, StreamInfo as CommandStreamInfo};
use crate::error::Http2Error;
use crate::frame::{decode, encode, Frame, RawFrame};
use crate::hpack::{HpackDecoder, HpackEncoder};
use crate::request::{normalize_header_name, Method, Request};
use crate::response::Response;
use crate::stream::Stream;
use crate::types::{
    ErrorCode, Headers, SettingsParameter, StreamId, CLIENT_PREFACE, DEFAULT_INITIAL_WINDOW_SIZE,
    DEFAULT_MAX_FRAME_SIZE, MAX_WINDOW_SIZE, WINDOW_UPDATE_THRESHOLD,
};
use enum_map::{enum_map, EnumMap};
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

/// Lets [`Connection::with_stream_result`] accept handlers that return
/// either `()` (no frame to emit) or `Option<Frame>` uniformly.
trait MaybeFrame {
    fn into_frame(self) -> Option<Frame>;
}

impl MaybeFrame for () {
    fn into_frame(self) -> Option<Frame> {
        None
    }
}

impl MaybeFrame for Option<Frame> {
    fn into_frame(self) -> Option<Frame> {
        self
    }
}

/// Server-advertised SETTINGS, defaulted per RFC 7540 §6.5.2 until the
/// peer's first SETTINGS frame arrives.
fn default_server_settings() -> EnumMap<SettingsParameter, u32> {
    enum_map! {
        SettingsParameter::HeaderTableSize => 4096,
        SettingsParameter::EnablePush => 1,
        SettingsParameter::MaxConcurrentStreams => u32::MAX,
        SettingsParameter::InitialWindowSize => DEFAULT_INITIAL_WINDOW_SIZE as u32,
        SettingsParameter::MaxFrameSize => DEFAULT_MAX_FRAME_SIZE,
        SettingsParameter::MaxHeaderListSize => u32::MAX,
    }
}

pub struct Connection<W> {
    writer: W,
    hpack_encoder: HpackEncoder,
    hpack_decoder: HpackDecoder,
    streams: BTreeMap<StreamId, Stream>,
    next_client_stream_id: StreamId,
    send_window: i64,
    recv_window: i64,
    initial_recv_window: i64,
    /// The peer's current SETTINGS_INITIAL_WINDOW_SIZE (spec.md §3
    /// `initial_send_window`): seeds every newly created stream's
    /// `send_window`. Distinct from `send_window` above, which is the
    /// connection-level flow-control counter depleted by outbound DATA —
    /// conflating the two would make a new stream's window depend on how
    /// much the connection window happened to be consumed already.
    initial_send_window: i64,
    server_settings: EnumMap<SettingsParameter, u32>,
    push_promise_cache: HashMap<(Method, String), StreamId>,
    pending_pings: HashMap<[u8; 8], oneshot::Sender<Result<(), Http2Error>>>,
    next_ping_payload: u64,
    scheme: String,
    authority: String,
    default_headers: Headers,
    pub is_shutdown: bool,
}

impl<W: AsyncWrite + Unpin> Connection<W> {
    /// Writes the client preface and an initial empty SETTINGS frame. The
    /// SETTINGS ACK exchange is handled by the running loop as frames
    /// arrive (spec.md §4.4 "Construction").
    pub async fn start(mut writer: W, scheme: &str, authority: &str) -> Result<Self, Http2Error> {
        writer.write_all(CLIENT_PREFACE).await?;
        let mut this = Self {
            writer,
            hpack_encoder: HpackEncoder::new(),
            hpack_decoder: HpackDecoder::new(),
            streams: BTreeMap::new(),
            next_client_stream_id: 1,
            send_window: DEFAULT_INITIAL_WINDOW_SIZE,
            recv_window: DEFAULT_INITIAL_WINDOW_SIZE,
            initial_recv_window: DEFAULT_INITIAL_WINDOW_SIZE,
            initial_send_window: DEFAULT_INITIAL_WINDOW_SIZE,
            server_settings: default_server_settings(),
            push_promise_cache: HashMap::new(),
            pending_pings: HashMap::new(),
            next_ping_payload: 1,
            scheme: scheme.to_owned(),
            authority: authority.to_owned(),
            default_headers: Headers::new(),
            is_shutdown: false,
        };
        this.write_frame(&Frame::Settings {
            ack: false,
            params: Vec::new(),
        })
        .await?;
        Ok(this)
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<(), Http2Error> {
        let bytes = encode(frame, &mut self.hpack_encoder);
        self.writer.write_all(&bytes).await?;
        Ok(())
    }

    fn server_max_frame_size(&self) -> usize {
        self.server_settings[SettingsParameter::MaxFrameSize] as usize
    }

    pub fn set_header(&mut self, name: String, value: String) {
        self.default_headers.push((normalize_header_name(&name), value));
    }

    pub fn unset_header(&mut self, name: String, value: Option<String>) {
        let name = normalize_header_name(&name);
        self.default_headers
            .retain(|(k, v)| !(k == &name && value.as_ref().map_or(true, |value| v == value)));
    }

    fn allocate_stream_id(&mut self) -> StreamId {
        let id = self.next_client_stream_id;
        self.next_client_stream_id += 2;
        id
    }

    /// Walks every stream in id order, releasing queued DATA frames while
    /// credit allows (spec.md §4.3 "Drain pending"). `BTreeMap` keeps
    /// streams ordered by id, so no separate sort is needed.
    async fn drain_all_pending(&mut self) -> Result<(), Http2Error> {
        let ids: Vec<StreamId> = self.streams.keys().copied().collect();
        for id in ids {
            loop {
                let frames = {
                    let stream = self.streams.get_mut(&id).expect("stream present");
                    stream.drain_pending(&mut self.send_window)?
                };
                if frames.is_empty() {
                    break;
                }
                for frame in &frames {
                    self.write_frame(frame).await?;
                }
            }
        }
        Ok(())
    }

    /// Sends a GOAWAY with `error_code` and shuts the connection down
    /// (spec.md §9: conformant implementations SHOULD send GOAWAY on
    /// connection-level errors, unlike the historical snapshot).
    async fn goaway_and_shutdown(&mut self, error_code: ErrorCode, debug: &str) {
        if self.is_shutdown {
            return;
        }
        let last_stream_id = self.streams.keys().copied().max().unwrap_or(0);
        let frame = Frame::GoAway {
            last_stream_id,
            error_code,
            debug_data: bytes::Bytes::copy_from_slice(debug.as_bytes()),
        };
        if let Err(err) = self.write_frame(&frame).await {
            warn!("failed to send GOAWAY: {err}");
        }
        self.is_shutdown = true;
    }

    /// Decodes one raw frame off the wire and applies it. HPACK
    /// decompression happens here, inside the event loop, so the dynamic
    /// table has exactly one mutator (spec.md §5) — the frame-reader task
    /// only ever produces undecoded [`RawFrame`]s.
    pub async fn handle_raw(&mut self, raw: RawFrame) -> Result<(), Http2Error> {
        let frame = decode(raw, &mut self.hpack_decoder)?;
        self.handle_inbound(frame).await
    }

    /// Applies one inbound frame (spec.md §4.4 "Inbound dispatch").
    async fn handle_inbound(&mut self, frame: Frame) -> Result<(), Http2Error> {
        if frame.stream_id() == 0 {
            return self.handle_connection_frame(frame).await;
        }
        self.handle_stream_frame(frame).await
    }

    async fn handle_connection_frame(&mut self, frame: Frame) -> Result<(), Http2Error> {
        match frame {
            Frame::Settings { ack: true, .. } => Ok(()),
            Frame::Settings { ack: false, params } => {
                for (param, value) in params {
                    if param == SettingsParameter::InitialWindowSize {
                        let delta = value as i64 - self.initial_send_window;
                        self.initial_send_window = value as i64;
                        self.rebalance_send_windows(delta);
                    }
                    self.server_settings[param] = value;
                }
                self.write_frame(&Frame::Settings {
                    ack: true,
                    params: Vec::new(),
                })
                .await?;
                self.drain_all_pending().await
            }
            Frame::Ping { ack: false, payload } => {
                self.write_frame(&Frame::Ping { ack: true, payload }).await
            }
            Frame::Ping { ack: true, payload } => {
                if let Some(tx) = self.pending_pings.remove(&payload) {
                    let _ = tx.send(Ok(()));
                }
                Ok(())
            }
            Frame::WindowUpdate { increment, .. } => {
                self.send_window = (self.send_window + increment as i64).min(MAX_WINDOW_SIZE);
                self.drain_all_pending().await
            }
            Frame::GoAway { error_code, .. } => {
                debug!("peer sent GOAWAY: {}", error_code.name());
                self.is_shutdown = true;
                Ok(())
            }
            other => {
                let message = format!("unexpected {other:?} frame with stream id 0");
                self.goaway_and_shutdown(ErrorCode::ProtocolError, &message).await;
                Err(Http2Error::protocol(ErrorCode::ProtocolError, message))
            }
        }
    }

    /// SETTINGS_INITIAL_WINDOW_SIZE changes mid-connection rebalance every
    /// open stream's send window by the delta (spec.md §9, a REDESIGN
    /// FLAG over the historical snapshot, which only honored the initial
    /// value).
    fn rebalance_send_windows(&mut self, delta: i64) {
        if delta == 0 {
            return;
        }
        for stream in self.streams.values_mut() {
            stream.adjust_send_window(delta);
        }
    }

    async fn handle_stream_frame(&mut self, frame: Frame) -> Result<(), Http2Error> {
        match frame {
            Frame::PushPromise {
                stream_id,
                promised_stream_id,
                end_headers,
                headers,
            } => self.handle_push_promise(stream_id, promised_stream_id, end_headers, headers).await,

            Frame::Data {
                stream_id,
                end_stream,
                data,
            } => {
                let n = data.len() as i64;
                self.recv_window -= n;
                let connection_update = if self.recv_window < WINDOW_UPDATE_THRESHOLD {
                    let diff = self.initial_recv_window - self.recv_window;
                    self.recv_window += diff;
                    Some(Frame::WindowUpdate {
                        stream_id: 0,
                        increment: diff as u32,
                    })
                } else {
                    None
                };
                if let Some(frame) = connection_update {
                    self.write_frame(&frame).await?;
                }
                self.with_stream_result(stream_id, |stream| stream.on_data(data, end_stream))
                    .await
            }

            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                headers,
                ..
            } => {
                self.with_stream_result(stream_id, |stream| {
                    stream.on_headers(headers, end_stream, end_headers)
                })
                .await
            }

            Frame::RstStream {
                stream_id,
                error_code,
            } => {
                self.with_stream_result(stream_id, |stream| stream.on_rst_stream(error_code))
                    .await
            }

            Frame::WindowUpdate { stream_id, increment } => {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.on_window_update(increment);
                }
                self.drain_all_pending().await
            }

            Frame::Priority { stream_id, .. } => {
                if let Some(stream) = self.streams.get(&stream_id) {
                    stream.on_priority();
                }
                Ok(())
            }

            Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } => unreachable!(),
        }
    }

    /// Runs `f` against the stream, sending RST_STREAM and recording the
    /// failure if it returns a stream error (spec.md §4.3 receive path).
    async fn with_stream_result<T: MaybeFrame>(
        &mut self,
        stream_id: StreamId,
        f: impl FnOnce(&mut Stream) -> Result<T, Http2Error>,
    ) -> Result<(), Http2Error> {
        let stream = match self.streams.get_mut(&stream_id) {
            Some(stream) => stream,
            None => {
                warn!("frame for unknown stream {stream_id}, ignoring");
                return Ok(());
            }
        };
        match f(stream) {
            Ok(value) => {
                if let Some(frame) = value.into_frame() {
                    self.write_frame(&frame).await?;
                }
                Ok(())
            }
            Err(Http2Error::Stream(code, message)) => {
                warn!("stream {stream_id} error: {message}");
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    if let Ok(frame) = stream.send_rst_stream(code, message) {
                        self.write_frame(&frame).await?;
                    }
                }
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    async fn handle_push_promise(
        &mut self,
        associated_stream_id: StreamId,
        promised_stream_id: StreamId,
        end_headers: bool,
        headers: Headers,
    ) -> Result<(), Http2Error> {
        let associated_ok = self
            .streams
            .get(&associated_stream_id)
            .map(|s| matches!(s.state(), crate::stream_state::StreamState::Open | crate::stream_state::StreamState::HalfClosedLocal))
            .unwrap_or(false);
        if !associated_ok {
            let message = format!("PUSH_PROMISE on stream {associated_stream_id} not in open/half_closed_local");
            self.goaway_and_shutdown(ErrorCode::ProtocolError, &message).await;
            return Err(Http2Error::protocol(ErrorCode::ProtocolError, message));
        }
        if self.streams.contains_key(&promised_stream_id) {
            let message = format!("PUSH_PROMISE promised stream {promised_stream_id} is not idle");
            self.goaway_and_shutdown(ErrorCode::ProtocolError, &message).await;
            return Err(Http2Error::protocol(ErrorCode::ProtocolError, message));
        }

        // The promised stream must first transition idle -> reserved_remote via
        // the PUSH_PROMISE receipt itself (spec.md §4.2) before it is legal to
        // reset it: RST_STREAM sent while still idle is itself a state-machine
        // violation, so a non-GET rejection is only sendable after this call.
        let mut stream = Stream::new(promised_stream_id, self.initial_send_window, self.initial_recv_window);
        if let Err(err) = stream.on_push_promise(headers, end_headers) {
            if let Http2Error::Stream(code, message) = err {
                if let Ok(frame) = stream.send_rst_stream(code, message) {
                    self.write_frame(&frame).await?;
                }
                return Ok(());
            }
            return Err(err);
        }

        if stream.method.as_deref() != Some("GET") {
            if let Ok(frame) = stream.send_rst_stream(ErrorCode::RefusedStream, "only GET push promises are accepted") {
                self.write_frame(&frame).await?;
            }
            return Ok(());
        }
        let path = stream.path.clone();
        if let Some(path) = path {
            self.push_promise_cache.insert((Method::Get, path), promised_stream_id);
        }
        self.streams.insert(promised_stream_id, stream);
        Ok(())
    }

    /// Issues a GET/PUT/POST (spec.md §4.4 "Outbound HTTP command
    /// execution").
    pub async fn handle_http_command(
        &mut self,
        request: Request,
        respond_to: oneshot::Sender<Result<Response, Http2Error>>,
    ) -> Result<(), Http2Error> {
        if request.method == Method::Get {
            if let Some(stream_id) = self.push_promise_cache.remove(&(Method::Get, request.path.clone())) {
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.associate_with_command(respond_to);
                    return Ok(());
                }
            }
        }

        let stream_id = self.allocate_stream_id();
        let mut headers = vec![
            (":method".to_owned(), request.method.to_string()),
            (":scheme".to_owned(), self.scheme.clone()),
            (":authority".to_owned(), self.authority.clone()),
            (":path".to_owned(), request.path.clone()),
        ];
        headers.extend(self.default_headers.clone());
        headers.extend(request.headers.clone());
        if !request.body.is_empty() {
            headers.push(("content-length".to_owned(), request.body.len().to_string()));
        }

        let mut stream = Stream::new(stream_id, self.initial_send_window, self.initial_recv_window);
        stream.method = Some(request.method.to_string());
        stream.path = Some(request.path.clone());
        stream.associate_with_command(respond_to);

        let end_stream = request.body.is_empty();
        let frame = stream.send_headers(headers, end_stream)?;
        self.streams.insert(stream_id, stream);
        self.write_frame(&frame).await?;

        if !request.body.is_empty() {
            let max_frame_size = self.server_max_frame_size();
            let mut offset = 0;
            let body = request.body;
            while offset < body.len() {
                let end = (offset + max_frame_size).min(body.len());
                let chunk = body.slice(offset..end);
                let last = end == body.len();
                let stream = self.streams.get_mut(&stream_id).expect("stream just inserted");
                if let Some(frame) = stream.send_data(chunk, last, &mut self.send_window)? {
                    self.write_frame(&frame).await?;
                }
                offset = end;
            }
        }
        Ok(())
    }

    /// Allocates the next ping payload and emits PING without ACK
    /// (spec.md §4.4 "Outbound ping").
    pub async fn handle_ping_command(
        &mut self,
        respond_to: oneshot::Sender<Result<(), Http2Error>>,
    ) -> Result<(), Http2Error> {
        let payload = self.next_ping_payload.to_be_bytes();
        self.next_ping_payload += 1;
        self.pending_pings.insert(payload, respond_to);
        self.write_frame(&Frame::Ping {
            ack: false,
            payload,
        })
        .await
    }

    pub fn push_list(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .push_promise_cache
            .keys()
            .map(|(_, path)| path.clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn stream_info(&self, include_closed: bool) -> Vec<CommandStreamInfo> {
        let cached: std::collections::HashSet<StreamId> =
            self.push_promise_cache.values().copied().collect();
        let mut records: Vec<CommandStreamInfo> = self
            .streams
            .iter()
            .filter(|(_, stream)| include_closed || !stream.is_closed())
            .map(|(&id, stream)| CommandStreamInfo {
                stream_id: id,
                method: stream.method.clone(),
                path: stream.path.clone(),
                state: stream.state(),
                is_cached_push_promise: cached.contains(&id),
            })
            .collect();
        records.sort_by_key(|record| record.stream_id);
        records
    }

    pub async fn handle_command(&mut self, command: Command) -> Result<(), Http2Error> {
        match command {
            Command::Http { request, respond_to } => self.handle_http_command(request, respond_to).await,
            Command::Ping { respond_to } => self.handle_ping_command(respond_to).await,
            Command::StartPingInterval { .. } | Command::StopPingInterval => {
                unreachable!("ping interval scheduling is handled by the event loop")
            }
            Command::PushList { respond_to } => {
                let _ = respond_to.send(self.push_list());
                Ok(())
            }
            Command::StreamInfo { include_closed, respond_to } => {
                let _ = respond_to.send(self.stream_info(include_closed));
                Ok(())
            }
            Command::SetHeader { name, value } => {
                self.set_header(name, value);
                Ok(())
            }
            Command::UnsetHeader { name, value } => {
                self.unset_header(name, value);
                Ok(())
            }
            Command::Disconnect => {
                self.is_shutdown = true;
                Ok(())
            }
        }
    }

    /// Surfaces a fatal connection-level error by sending GOAWAY and
    /// marking the connection shut down.
    pub async fn fail(&mut self, error_code: ErrorCode, message: &str) {
        self.goaway_and_shutdown(error_code, message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{DataFlags, SettingsFlags};
    use crate::types::FrameType;
    use num_traits::ToPrimitive;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    /// Starts a `Connection` over an in-memory duplex pipe and drains the
    /// client preface + initial empty SETTINGS frame off the peer side, so
    /// later reads on `server_side` see only what the test itself provokes.
    async fn test_connection() -> (Connection<DuplexStream>, DuplexStream) {
        let (client_side, mut server_side) = duplex(1 << 20);
        let conn = Connection::start(client_side, "https", "test.local").await.unwrap();
        let mut preface = [0u8; CLIENT_PREFACE.len()];
        server_side.read_exact(&mut preface).await.unwrap();
        assert_eq!(&preface, CLIENT_PREFACE);
        let initial = RawFrame::read(&mut server_side).await.unwrap();
        assert_eq!(initial.frame_type, FrameType::Settings.to_u8().unwrap());
        (conn, server_side)
    }

    /// Testable property 6: successive client-initiated streams receive
    /// strictly increasing odd ids starting at 1.
    #[tokio::test]
    async fn stream_ids_are_strictly_increasing_odd_numbers() {
        let (mut conn, _server) = test_connection().await;
        assert_eq!(conn.allocate_stream_id(), 1);
        assert_eq!(conn.allocate_stream_id(), 3);
        assert_eq!(conn.allocate_stream_id(), 5);
    }

    /// Testable property 8 / scenario S4: a GET issued after a matching
    /// PUSH_PROMISE consumes the cache entry and reuses the promised stream
    /// instead of allocating a new one; a second GET for the same path goes
    /// out as an ordinary request.
    #[tokio::test]
    async fn push_promise_cache_is_consumed_exactly_once() {
        let (mut conn, _server) = test_connection().await;

        let (respond_to, _rx) = oneshot::channel();
        conn.handle_http_command(Request::get("/"), respond_to).await.unwrap();
        assert_eq!(conn.next_client_stream_id, 3);

        conn.handle_push_promise(
            1,
            2,
            true,
            vec![(":method".into(), "GET".into()), (":path".into(), "/a.css".into())],
        )
        .await
        .unwrap();
        assert_eq!(conn.push_list(), vec!["/a.css".to_owned()]);

        let (respond_to, _rx) = oneshot::channel();
        conn.handle_http_command(Request::get("/a.css"), respond_to).await.unwrap();
        assert!(conn.push_list().is_empty());
        assert_eq!(conn.next_client_stream_id, 3, "no new stream allocated for the cached push");

        let (respond_to, _rx) = oneshot::channel();
        conn.handle_http_command(Request::get("/a.css"), respond_to).await.unwrap();
        assert_eq!(conn.next_client_stream_id, 5, "the second GET for the same path is an ordinary request");
    }

    /// spec.md §9 REDESIGN FLAG: the engine emits a SETTINGS ACK on receipt,
    /// and honors the peer's new MAX_FRAME_SIZE.
    #[tokio::test]
    async fn settings_receipt_emits_ack_and_updates_max_frame_size() {
        let (mut conn, mut server) = test_connection().await;

        conn.handle_connection_frame(Frame::Settings {
            ack: false,
            params: vec![(SettingsParameter::MaxFrameSize, 20_000)],
        })
        .await
        .unwrap();

        let ack = RawFrame::read(&mut server).await.unwrap();
        assert_eq!(ack.frame_type, FrameType::Settings.to_u8().unwrap());
        assert!(SettingsFlags::from_bits_truncate(ack.flags).contains(SettingsFlags::ACK));
        assert_eq!(conn.server_max_frame_size(), 20_000);
    }

    /// spec.md §9 REDESIGN FLAG: a connection-level protocol error sends
    /// GOAWAY before shutting down, instead of only logging.
    #[tokio::test]
    async fn protocol_error_on_stream_zero_sends_goaway_and_shuts_down() {
        let (mut conn, mut server) = test_connection().await;

        let err = conn
            .handle_connection_frame(Frame::RstStream { stream_id: 0, error_code: ErrorCode::Cancel })
            .await;
        assert!(err.is_err());
        assert!(conn.is_shutdown);

        let goaway = RawFrame::read(&mut server).await.unwrap();
        assert_eq!(goaway.frame_type, FrameType::GoAway.to_u8().unwrap());
    }

    /// spec.md §8 scenario S2: a body larger than the peer's MAX_FRAME_SIZE
    /// is split into multiple DATA frames, the last carrying END_STREAM.
    #[tokio::test]
    async fn post_body_is_fragmented_by_peer_max_frame_size() {
        let (mut conn, mut server) = test_connection().await;

        conn.handle_connection_frame(Frame::Settings {
            ack: false,
            params: vec![(SettingsParameter::MaxFrameSize, 16)],
        })
        .await
        .unwrap();
        let _ack = RawFrame::read(&mut server).await.unwrap();

        let (respond_to, _rx) = oneshot::channel();
        let body = bytes::Bytes::from(vec![7u8; 40]);
        conn.handle_http_command(Request::post("/upload", body.clone()), respond_to)
            .await
            .unwrap();

        let headers_frame = RawFrame::read(&mut server).await.unwrap();
        assert_eq!(headers_frame.frame_type, FrameType::Headers.to_u8().unwrap());

        let mut total = 0;
        let mut saw_end_stream = false;
        while total < body.len() {
            let data_frame = RawFrame::read(&mut server).await.unwrap();
            assert_eq!(data_frame.frame_type, FrameType::Data.to_u8().unwrap());
            assert!(data_frame.payload.len() <= 16);
            total += data_frame.payload.len();
            saw_end_stream = DataFlags::from_bits_truncate(data_frame.flags).contains(DataFlags::END_STREAM);
        }
        assert_eq!(total, body.len());
        assert!(saw_end_stream);
    }

    /// scenario S6: a stream reset by the peer fails only that stream's
    /// command; subsequent requests on other streams are unaffected.
    #[tokio::test]
    async fn rst_stream_fails_only_its_own_command() {
        let (mut conn, mut server) = test_connection().await;

        let (respond_to, rx) = oneshot::channel();
        conn.handle_http_command(Request::get("/"), respond_to).await.unwrap();
        let _headers_frame = RawFrame::read(&mut server).await.unwrap();

        conn.handle_inbound(Frame::RstStream { stream_id: 1, error_code: ErrorCode::RefusedStream })
            .await
            .unwrap();

        let result = rx.await.unwrap();
        let err = result.unwrap_err();
        assert!(err.to_string().contains("REFUSED_STREAM"));
        assert!(!conn.is_shutdown);

        let (respond_to, _rx) = oneshot::channel();
        conn.handle_http_command(Request::get("/"), respond_to).await.unwrap();
        assert_eq!(conn.next_client_stream_id, 5);
    }

    /// spec.md §4.4: a PUSH_PROMISE whose `:method` isn't GET is rejected
    /// with RST_STREAM(REFUSED_STREAM) on the promised stream, and never
    /// enters the push-promise cache. The promised stream must reach
    /// reserved_remote before the reset can legally be sent (RST_STREAM
    /// sent while idle is itself a state-machine violation).
    #[tokio::test]
    async fn non_get_push_promise_is_reset_and_never_cached() {
        let (mut conn, mut server) = test_connection().await;

        let (respond_to, _rx) = oneshot::channel();
        conn.handle_http_command(Request::get("/"), respond_to).await.unwrap();
        let _headers_frame = RawFrame::read(&mut server).await.unwrap();

        conn.handle_push_promise(
            1,
            2,
            true,
            vec![
                (":method".into(), "POST".into()),
                (":path".into(), "/a.css".into()),
            ],
        )
        .await
        .unwrap();

        let reset = RawFrame::read(&mut server).await.unwrap();
        assert_eq!(reset.frame_type, FrameType::RstStream.to_u8().unwrap());
        assert_eq!(reset.stream_id, 2);
        assert!(conn.push_list().is_empty());
        assert!(!conn.streams.contains_key(&2));
    }
}
