//! The event loop (spec.md §4.5, §5): a single cooperative task that
//! multiplexes three event sources into the Connection Engine — inbound
//! frames, user commands, and a shutdown signal. Every mutation of engine
//! state happens here; no lock is required because nothing else ever
//! touches `connection`.

use crate::command::Command;
use crate::connection::Connection;
use crate::frame::RawFrame;
use log::{error, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Spawns the dedicated reader task (spec.md §5: "exactly one auxiliary
/// parallel thread for blocking reads on the TLS socket"). It only reads
/// frame headers and payloads off the wire — HPACK decompression happens
/// in the event loop, where the dynamic table's single mutator lives.
fn spawn_reader<R>(mut reader: R, raw_tx: mpsc::UnboundedSender<RawFrame>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match RawFrame::read(&mut reader).await {
                Ok(raw) => {
                    if raw_tx.send(raw).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    trace!("frame reader exiting: {err}");
                    return;
                }
            }
        }
    })
}

/// Runs the event loop to completion. Consumes `connection`: once this
/// future resolves the connection is shut down and the reader task has
/// been stopped.
///
/// `commands_rx` is the sole receiver for the user-facing channel every
/// [`crate::client::Client`] clone sends on; this function never clones or
/// otherwise holds onto its matching sender, so its `None` arm below fires
/// for real once every `Client` clone is dropped — the repeated-ping
/// ticker is fed through its own dedicated internal channel instead (see
/// `ping_tx`/`ping_rx`) precisely so it doesn't keep that sender alive.
pub async fn run<W>(
    mut connection: Connection<W>,
    reader: impl AsyncRead + Unpin + Send + 'static,
    mut commands_rx: mpsc::UnboundedReceiver<Command>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    W: AsyncWrite + Unpin,
{
    let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
    let reader_handle = spawn_reader(reader, raw_tx);
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel::<Command>();
    let mut ping_interval: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            raw = raw_rx.recv() => {
                match raw {
                    Some(raw) => {
                        if let Err(err) = connection.handle_raw(raw).await {
                            error!("connection error: {err}");
                            fail(&mut connection, &err).await;
                        }
                    }
                    None => {
                        trace!("reader task gone, shutting down");
                        connection.is_shutdown = true;
                    }
                }
            }
            command = commands_rx.recv() => {
                match command {
                    Some(Command::StartPingInterval { interval }) => {
                        if let Some(handle) = ping_interval.take() {
                            handle.abort();
                        }
                        ping_interval = Some(spawn_ping_interval(interval, ping_tx.clone()));
                    }
                    Some(Command::StopPingInterval) => {
                        if let Some(handle) = ping_interval.take() {
                            handle.abort();
                        }
                    }
                    Some(command) => {
                        if let Err(err) = connection.handle_command(command).await {
                            error!("command dispatch error: {err}");
                            fail(&mut connection, &err).await;
                        }
                    }
                    None => {
                        trace!("every Client handle dropped, shutting down");
                        connection.is_shutdown = true;
                    }
                }
            }
            ping = ping_rx.recv() => {
                if let Some(command) = ping {
                    if let Err(err) = connection.handle_command(command).await {
                        error!("command dispatch error: {err}");
                        fail(&mut connection, &err).await;
                    }
                }
            }
            _ = &mut shutdown_rx => {
                trace!("shutdown signal received");
                connection.is_shutdown = true;
            }
        }

        if connection.is_shutdown {
            break;
        }
    }

    if let Some(handle) = ping_interval.take() {
        handle.abort();
    }
    reader_handle.abort();
}

/// Surfaces a fatal error to the peer (GOAWAY, when the error names a
/// protocol code) and marks the connection shut down.
async fn fail<W: AsyncWrite + Unpin>(connection: &mut Connection<W>, err: &crate::error::Http2Error) {
    match err.connection_error_code() {
        Some(code) => connection.fail(code, &err.to_string()).await,
        None => {
            warn!("fatal non-protocol error, shutting down without GOAWAY: {err}");
            connection.is_shutdown = true;
        }
    }
}

/// Ticks a PING without ACK on `interval`, feeding it back through the
/// internal ping channel like any user-issued ping (spec.md §6 "ping
/// --interval"). The caller holds the returned handle and aborts it to
/// implement "prior interval replaced if any" / "ping --stop".
fn spawn_ping_interval(interval: std::time::Duration, ping_tx: mpsc::UnboundedSender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let (respond_to, _ack) = oneshot::channel();
            if ping_tx.send(Command::Ping { respond_to }).is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, split};

    /// Dropping every sender on the user-facing commands channel (standing
    /// in for every [`crate::client::Client`] clone going away without
    /// calling `disconnect()`) must make `run` return on its own, via the
    /// real `None` arm on `commands_rx.recv()` — not leak the task forever.
    /// `server_side` is kept alive (unread) for the whole test so the
    /// reader task stays blocked instead of racing this shutdown path via
    /// its own "reader task gone" arm.
    #[tokio::test]
    async fn run_exits_once_every_command_sender_is_dropped() {
        let (client_side, server_side) = duplex(1 << 16);
        let (read_half, write_half) = split(client_side);
        let connection = Connection::start(write_half, "https", "test.local").await.unwrap();

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(connection, read_half, commands_rx, shutdown_rx));

        drop(commands_tx);

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run() should exit once every command sender is dropped")
            .unwrap();

        drop(server_side);
    }
}
