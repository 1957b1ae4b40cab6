use enum_map::Enum;
use num_derive::{FromPrimitive, ToPrimitive};

/// 31-bit stream identifier as it appears on the wire (top bit always clear).
pub type StreamId = u32;

/// Ordered header list, preserving both duplicates and arrival order
/// (spec.md §3: "ordered list of (name, value) pairs").
pub type Headers = Vec<(String, String)>;

/// <https://httpwg.org/specs/rfc7540.html#FrameTypes>
///
/// `Continuation` is intentionally absent: CONTINUATION frames are a
/// non-goal, a HEADERS/PUSH_PROMISE without END_HEADERS aborts the stream
/// with REFUSED_STREAM instead of waiting for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
}

/// <https://httpwg.org/specs/rfc7540.html#ErrorCodes>
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    /// Name as it appears in RFC 7540, used in stream/command error messages
    /// (spec.md §7: "... including the error code name").
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

/// <https://httpwg.org/specs/rfc7540.html#SettingValues>
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive, Enum,
)]
#[repr(u16)]
pub enum SettingsParameter {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
}

/// SETTINGS_INITIAL_WINDOW_SIZE default (spec.md §3).
pub const DEFAULT_INITIAL_WINDOW_SIZE: i64 = 65_535;
/// SETTINGS_MAX_FRAME_SIZE default (spec.md §3 `server_max_frame_size`).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
/// Flow-control windows must not exceed 2^31 - 1 (spec.md §3 invariant).
pub const MAX_WINDOW_SIZE: i64 = (1i64 << 31) - 1;
/// WINDOW_UPDATE is emitted once the window falls below this many bytes of
/// credit (spec.md §4.3: "threshold = 8192 bytes ... ≤ 16384").
pub const WINDOW_UPDATE_THRESHOLD: i64 = 8_192;
/// The fixed 24-byte client connection preface (spec.md §6).
pub const CLIENT_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
