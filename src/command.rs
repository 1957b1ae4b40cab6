//! User commands fed into the event loop (spec.md §4.5, §6 "User-facing
//! command surface"). The IPC/CLI framing that serializes these across a
//! process boundary is out of scope (spec.md §1); only the in-process
//! engine API is implemented here.

use crate::error::Http2Error;
use crate::request::Request;
use crate::response::Response;
use crate::stream_state::StreamState;
use crate::types::StreamId;
use std::time::Duration;
use tokio::sync::oneshot;

/// Per-stream snapshot produced by the `stream-info` command, grounded on
/// the collaborator's `StreamInfo` record (stream id, method, path, state,
/// cached-push-promise flag).
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub stream_id: StreamId,
    pub method: Option<String>,
    pub path: Option<String>,
    pub state: StreamState,
    pub is_cached_push_promise: bool,
}

pub enum Command {
    Http {
        request: Request,
        respond_to: oneshot::Sender<Result<Response, Http2Error>>,
    },
    Ping {
        respond_to: oneshot::Sender<Result<(), Http2Error>>,
    },
    StartPingInterval {
        interval: Duration,
    },
    StopPingInterval,
    PushList {
        respond_to: oneshot::Sender<Vec<String>>,
    },
    StreamInfo {
        include_closed: bool,
        respond_to: oneshot::Sender<Vec<StreamInfo>>,
    },
    SetHeader {
        name: String,
        value: String,
    },
    UnsetHeader {
        name: String,
        value: Option<String>,
    },
    Disconnect,
}
