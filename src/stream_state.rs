//! The stream finite-state machine (spec.md §4.2).
//!
//! A pure function from `(current_state, frame kind, direction)` to either a
//! new state or a `STREAM_CLOSED` error. This is the sole authoritative
//! transition logic — every frame, inbound or outbound, is routed through
//! it before any other stream mutation happens.

use crate::error::Http2Error;
use crate::types::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamState {
    Idle,
    Open,
    ReservedLocal,
    ReservedRemote,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    pub fn is_closed(self) -> bool {
        self == StreamState::Closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// The frame kinds that drive stream-state transitions. DATA and HEADERS
/// additionally carry whether END_STREAM was set; other kinds never change
/// state here (PRIORITY, SETTINGS, PING, GOAWAY, WINDOW_UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data { end_stream: bool },
    Headers { end_stream: bool },
    RstStream,
    /// Only meaningful inbound, for the newly promised stream.
    PushPromise,
    Other,
}

/// Applies a single frame to `state` and returns the successor state, or a
/// `STREAM_CLOSED` stream error if the frame is illegal in `state`
/// (spec.md §4.2; testable property 4: total over every triple).
pub fn transition(
    state: StreamState,
    kind: FrameKind,
    direction: Direction,
) -> Result<StreamState, Http2Error> {
    use Direction::{Inbound, Outbound};
    use FrameKind::*;
    use StreamState::*;

    match (kind, direction) {
        (RstStream, Inbound) | (RstStream, Outbound) => {
            if state == Idle {
                return Err(illegal(kind, state));
            }
            Ok(Closed)
        }

        (Data { end_stream }, Inbound) => {
            if !matches!(state, Open | HalfClosedLocal) {
                return Err(illegal(kind, state));
            }
            Ok(apply_end_stream_inbound(state, end_stream))
        }
        (Data { end_stream }, Outbound) => {
            if !matches!(state, Open | HalfClosedRemote) {
                return Err(illegal(kind, state));
            }
            Ok(apply_end_stream_outbound(state, end_stream))
        }

        (Headers { end_stream }, Inbound) => {
            if !matches!(state, Open | HalfClosedLocal | ReservedRemote) {
                return Err(illegal(kind, state));
            }
            let state = if state == ReservedRemote {
                HalfClosedLocal
            } else {
                state
            };
            Ok(apply_end_stream_inbound(state, end_stream))
        }
        (Headers { end_stream }, Outbound) => {
            if !matches!(state, Idle | Open | HalfClosedRemote) {
                return Err(illegal(kind, state));
            }
            let state = if state == Idle { Open } else { state };
            Ok(apply_end_stream_outbound(state, end_stream))
        }

        (PushPromise, Inbound) => {
            if state != Idle {
                return Err(illegal(kind, state));
            }
            Ok(ReservedRemote)
        }
        (PushPromise, Outbound) => Ok(state),

        (Other, _) => Ok(state),
    }
}

fn apply_end_stream_inbound(state: StreamState, end_stream: bool) -> StreamState {
    use StreamState::*;
    if !end_stream {
        return state;
    }
    match state {
        Open => HalfClosedRemote,
        HalfClosedLocal => Closed,
        other => other,
    }
}

fn apply_end_stream_outbound(state: StreamState, end_stream: bool) -> StreamState {
    use StreamState::*;
    if !end_stream {
        return state;
    }
    match state {
        Open => HalfClosedLocal,
        HalfClosedRemote => Closed,
        other => other,
    }
}

fn illegal(kind: FrameKind, state: StreamState) -> Http2Error {
    Http2Error::stream(
        ErrorCode::StreamClosed,
        format!("Received {kind:?} frame for stream in state {state:?}."),
    )
}
