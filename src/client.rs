//! The public API (spec.md §6 "User-facing command surface"): a cheaply
//! cloneable handle to a running connection. Every method sends a
//! [`Command`] into the event loop and, where a reply is expected, awaits
//! it through a `oneshot` channel with the request's own timeout.

use crate::command::{Command, StreamInfo};
use crate::connection::Connection;
use crate::duration::DEFAULT_COMMAND_TIMEOUT;
use crate::error::Http2Error;
use crate::event_loop;
use crate::request::Request;
use crate::response::Response;
use crate::socket::{self, TlsConfig};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::split;
use tokio::sync::{mpsc, oneshot};

const DEFAULT_PORT: u16 = 443;

/// A handle to one HTTP/2 connection. Cloning a `Client` shares the same
/// underlying connection (spec.md §4.1 "one Connection Engine per TCP
/// socket"); the engine itself runs in a detached task and outlives any
/// individual clone.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
    /// Held for the connection's lifetime so the event loop's shutdown
    /// source (spec.md §4.5) only fires when every clone agrees to
    /// disconnect, never as a side effect of `connect_with` returning.
    shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl Client {
    /// Connects to `host` on the default HTTPS port (443) with default TLS
    /// settings (peer verification disabled, per spec.md §6).
    pub async fn connect(host: &str) -> Result<Self, Http2Error> {
        Self::connect_with_port(host, DEFAULT_PORT).await
    }

    pub async fn connect_with_port(host: &str, port: u16) -> Result<Self, Http2Error> {
        Self::connect_with(host, port, TlsConfig::default()).await
    }

    /// Connects with a caller-supplied TLS configuration, spawns the
    /// engine and its event loop, and returns immediately.
    pub async fn connect_with(host: &str, port: u16, tls_config: TlsConfig) -> Result<Self, Http2Error> {
        let stream = socket::connect(host, port, &tls_config).await?;
        let (read_half, write_half) = split(stream);
        let authority = if port == DEFAULT_PORT {
            host.to_owned()
        } else {
            format!("{host}:{port}")
        };
        let connection = Connection::start(write_half, "https", &authority).await?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(event_loop::run(connection, read_half, commands_rx, shutdown_rx));

        Ok(Self {
            commands: commands_tx,
            shutdown: Arc::new(Mutex::new(Some(shutdown_tx))),
        })
    }

    /// Sends `request` and awaits its response, timing out after
    /// `request.timeout`. A command whose timeout fires is not retracted:
    /// the engine may still complete it later, but nobody is listening, so
    /// the late reply is silently dropped (spec.md §4.5 "independent
    /// timers").
    pub async fn request(&self, request: Request) -> Result<Response, Http2Error> {
        let (respond_to, rx) = oneshot::channel();
        let timeout = request.timeout;
        self.commands
            .send(Command::Http { request, respond_to })
            .map_err(|_| Http2Error::NotConnected)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Http2Error::NotConnected),
            Err(_) => Err(Http2Error::Timeout(timeout.as_secs())),
        }
    }

    #[inline]
    pub async fn get(&self, path: impl Into<String>) -> Result<Response, Http2Error> {
        self.request(Request::get(path)).await
    }

    #[inline]
    pub async fn put(&self, path: impl Into<String>, body: impl Into<Bytes>) -> Result<Response, Http2Error> {
        self.request(Request::put(path, body)).await
    }

    #[inline]
    pub async fn post(&self, path: impl Into<String>, body: impl Into<Bytes>) -> Result<Response, Http2Error> {
        self.request(Request::post(path, body)).await
    }

    #[cfg(feature = "json")]
    pub async fn post_json<T: serde::Serialize>(&self, path: impl Into<String>, value: &T) -> Result<Response, Http2Error> {
        let request = Request::post_json(path, value).map_err(|err| Http2Error::InvalidInput(err.to_string()))?;
        self.request(request).await
    }

    /// Adds a header sent on every subsequent request (spec.md §6
    /// "set-header"). May be called repeatedly; values accumulate.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) -> Result<(), Http2Error> {
        self.commands
            .send(Command::SetHeader { name: name.into(), value: value.into() })
            .map_err(|_| Http2Error::NotConnected)
    }

    /// Removes headers added with [`Client::set_header`] (spec.md §6
    /// "unset-header"). `value` narrows the match to a specific value;
    /// `None` removes every header with that name.
    pub fn unset_header(&self, name: impl Into<String>, value: Option<String>) -> Result<(), Http2Error> {
        self.commands
            .send(Command::UnsetHeader { name: name.into(), value })
            .map_err(|_| Http2Error::NotConnected)
    }

    /// Sends one PING and awaits the ACK, timing out after
    /// [`DEFAULT_COMMAND_TIMEOUT`].
    pub async fn ping(&self) -> Result<(), Http2Error> {
        let (respond_to, rx) = oneshot::channel();
        self.commands
            .send(Command::Ping { respond_to })
            .map_err(|_| Http2Error::NotConnected)?;
        match tokio::time::timeout(DEFAULT_COMMAND_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Http2Error::NotConnected),
            Err(_) => Err(Http2Error::Timeout(DEFAULT_COMMAND_TIMEOUT.as_secs())),
        }
    }

    /// Starts (or replaces) a recurring unsolicited PING on `interval`
    /// (spec.md §6 "ping --interval").
    pub fn start_ping_interval(&self, interval: Duration) -> Result<(), Http2Error> {
        self.commands
            .send(Command::StartPingInterval { interval })
            .map_err(|_| Http2Error::NotConnected)
    }

    /// Stops a running ping interval, if any (spec.md §6 "ping --stop").
    pub fn stop_ping_interval(&self) -> Result<(), Http2Error> {
        self.commands.send(Command::StopPingInterval).map_err(|_| Http2Error::NotConnected)
    }

    /// The set of paths currently cached from an unclaimed PUSH_PROMISE
    /// (spec.md §6 "push-list").
    pub async fn push_list(&self) -> Result<Vec<String>, Http2Error> {
        let (respond_to, rx) = oneshot::channel();
        self.commands.send(Command::PushList { respond_to }).map_err(|_| Http2Error::NotConnected)?;
        rx.await.map_err(|_| Http2Error::NotConnected)
    }

    /// A snapshot of every stream the engine still tracks (spec.md §6
    /// "stream-info"). `include_closed` also returns streams that have
    /// already reached the `closed` state.
    pub async fn stream_info(&self, include_closed: bool) -> Result<Vec<StreamInfo>, Http2Error> {
        let (respond_to, rx) = oneshot::channel();
        self.commands
            .send(Command::StreamInfo { include_closed, respond_to })
            .map_err(|_| Http2Error::NotConnected)?;
        rx.await.map_err(|_| Http2Error::NotConnected)
    }

    /// Closes the connection (spec.md §6 "disconnect"). Idempotent: a
    /// second call finds the shutdown slot already taken and the command
    /// send already failing, both treated as success.
    pub fn disconnect(&self) {
        if let Some(tx) = self.shutdown.lock().unwrap().take() {
            let _ = tx.send(());
        }
        let _ = self.commands.send(Command::Disconnect);
    }
}
