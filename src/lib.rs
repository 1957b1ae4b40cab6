#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation, // TODO
    clippy::too_many_lines, // TODO
)]

mod client;
mod command;
mod connection;
mod duration;
mod error;
mod event_loop;
mod flags;
mod frame;
mod hpack;
mod request;
mod response;
mod socket;
mod stream;
mod stream_state;
mod types;

pub use bytes::Bytes;
pub use client::Client;
pub use command::StreamInfo;
pub use duration::{parse_interval, DEFAULT_COMMAND_TIMEOUT};
pub use error::Http2Error;
pub use request::{Method, Request};
pub use response::Response;
pub use socket::TlsConfig;
pub use stream_state::StreamState;
