// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The command-client driver (spec §4.6, §5). One `tokio::spawn`ed task
//! owns the connection's socket, parser state, and pending-request
//! queue for the life of the connection; [`CommandClient`] is the
//! cheaply-`Clone`able handle callers hold, mirroring the teacher's
//! `Arc<ClientConnection>` + spawned `read_loop` shape but without the
//! `Arc`/`Mutex`/`DashMap` layer the teacher needs for its multi-caller
//! per-ITT channels — here the driver task is the sole owner and the
//! only shared state is the `mpsc` channel into it.

use std::collections::VecDeque;

use tokio::{
    io::AsyncReadExt,
    sync::{mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, error, warn};

use crate::{
    cfg::config::{Config, ReconnectSleep},
    connection::{bootstrap, state::ConnectionState},
    error::{Error, Result},
    resp::{ParseOutcome, Reply, ReplyCode, parse},
};

const READ_CHUNK: usize = 8192;

enum DriverCommand {
    Request {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<Reply>>,
    },
    Pipeline {
        bytes: Vec<u8>,
        count: u32,
        reply: oneshot::Sender<Result<Vec<Reply>>>,
    },
    Stop,
}

/// A queue entry tagged the way spec §3 describes: `Single` expects one
/// reply, `Pipeline` expects `remaining` more, accumulating them in
/// arrival order (a plain `Vec::push` gives the same order the source's
/// cons-then-reverse accumulator does, without the reverse).
enum Pending {
    Single(oneshot::Sender<Result<Reply>>),
    Pipeline(u32, oneshot::Sender<Result<Vec<Reply>>>, Vec<Reply>),
}

impl Pending {
    fn fail(self, err: Error) {
        match self {
            Pending::Single(tx) => {
                let _ = tx.send(Err(err));
            },
            Pending::Pipeline(_, tx, _) => {
                let _ = tx.send(Err(err));
            },
        }
    }
}

/// A cheaply-`Clone`able handle to a running driver task. Dropping every
/// clone drops the channel sender, which the driver observes as `Stop`.
#[derive(Clone)]
pub struct CommandClient {
    tx: mpsc::UnboundedSender<DriverCommand>,
}

impl CommandClient {
    /// Perform the initial bootstrap (spec §4.5) and spawn the driver
    /// task. Mirrors the teacher's `ClientConnection::connect` in that
    /// construction itself performs the handshake; reconnects after
    /// that happen entirely inside the driver task.
    pub async fn connect(config: Config) -> Result<Self> {
        let mut conn = ConnectionState::new(config);
        bootstrap::connect_into(&mut conn).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reconnect_deadline = initial_reconnect_deadline(&conn);
        let driver = Driver {
            conn,
            queue: VecDeque::new(),
            cmd_rx: rx,
            reconnect_deadline,
        };
        tokio::spawn(driver.run());
        Ok(CommandClient { tx })
    }

    /// Submit one command's encoded bytes (spec §4.6 `request`).
    pub async fn request(&self, bytes: Vec<u8>) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DriverCommand::Request { bytes, reply })
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Submit `count` concatenated commands' bytes (spec §4.6
    /// `pipeline`); resolves to exactly one list of `count` replies in
    /// arrival order.
    pub async fn pipeline(&self, bytes: Vec<u8>, count: u32) -> Result<Vec<Reply>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DriverCommand::Pipeline { bytes, count, reply })
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Terminate the driver cleanly (spec §4.6 `stop`). Any pending
    /// entries still in the queue receive `Error::Closed`.
    pub fn stop(&self) {
        let _ = self.tx.send(DriverCommand::Stop);
    }
}

fn initial_reconnect_deadline(conn: &ConnectionState) -> Option<Instant> {
    match conn.config.reconnect_sleep {
        ReconnectSleep::NoReconnect => None,
        ReconnectSleep::Millis(ms) => conn.connected_at.map(|at| at + Duration::from_millis(ms)),
    }
}

/// The driver task's private state, referenced from
/// [`crate::connection::state::ConnectionState`]'s doc comment.
struct Driver {
    conn: ConnectionState,
    queue: VecDeque<Pending>,
    cmd_rx: mpsc::UnboundedReceiver<DriverCommand>,
    /// When the current cooldown period (armed on every successful
    /// connect, spec §4.5 "On success...") elapses. Consulted by the
    /// disconnect handler to decide between the "timer already armed"
    /// and "no timer armed" cases in spec §4.6, and by the main loop to
    /// know when to retry a failed connection.
    reconnect_deadline: Option<Instant>,
}

impl Driver {
    async fn run(mut self) {
        let mut read_buf = vec![0u8; READ_CHUNK];
        loop {
            let deadline = self.reconnect_deadline;
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None | Some(DriverCommand::Stop) => {
                            self.shutdown().await;
                            return;
                        },
                        Some(DriverCommand::Request { bytes, reply }) => {
                            self.handle_submit(bytes, Pending::Single(reply)).await;
                        },
                        Some(DriverCommand::Pipeline { bytes, count, reply }) => {
                            self.handle_submit(bytes, Pending::Pipeline(count, reply, Vec::new())).await;
                        },
                    }
                },
                n = read_if_connected(&mut self.conn.socket, &mut read_buf) => {
                    if !self.handle_inbound(n, &read_buf).await {
                        return;
                    }
                },
                _ = sleep_until_opt(deadline) => {
                    self.attempt_reconnect().await;
                },
            }
        }
    }

    async fn handle_submit(&mut self, bytes: Vec<u8>, pending: Pending) {
        let Some(socket) = self.conn.socket.as_mut() else {
            pending.fail(Error::NoConnection);
            return;
        };
        match socket.send(&bytes).await {
            Ok(()) => self.queue.push_back(pending),
            Err(e) => {
                let reason = Error::from(e);
                pending.fail(reason.clone());
                self.on_transport_error(reason).await;
            },
        }
    }

    /// Returns `false` when the driver should stop entirely (only
    /// reached via the `empty_queue` fatal condition).
    async fn handle_inbound(&mut self, result: std::io::Result<usize>, chunk: &[u8]) -> bool {
        match result {
            Ok(0) => {
                self.on_transport_error(Error::Closed).await;
                true
            },
            Ok(n) => self.drain_parser(&chunk[..n]).await,
            Err(e) => {
                self.on_transport_error(Error::from(e)).await;
                true
            },
        }
    }

    async fn drain_parser(&mut self, chunk: &[u8]) -> bool {
        let mut leftover: Option<bytes::Bytes> = None;
        let mut first = Some(chunk);
        loop {
            let state = std::mem::take(&mut self.conn.parser);
            let fragment: &[u8] = match &leftover {
                Some(b) => b.as_ref(),
                None => first.take().unwrap_or(&[]),
            };
            match parse(state, fragment) {
                Ok(ParseOutcome::Continue(state)) => {
                    self.conn.parser = state;
                    return true;
                },
                Ok(ParseOutcome::Value { reply, code, leftover: tail, state }) => {
                    self.conn.parser = state;
                    if !self.reply_value(reply, code) {
                        return false;
                    }
                    if tail.is_empty() {
                        return true;
                    }
                    leftover = Some(tail);
                },
                Err(e) => {
                    self.on_transport_error(Error::Io(e.to_string())).await;
                    return true;
                },
            }
        }
    }

    /// Dispatch one decoded value to the head of the queue (spec §4.6
    /// `reply_value`). A server-sent `Error` reply (spec §7) is handed to
    /// the caller as `Err(Error::Server(_))` rather than disconnecting.
    /// Returns `false` if the queue was empty — the fatal `empty_queue`
    /// condition — after logging it.
    fn reply_value(&mut self, reply: Reply, code: ReplyCode) -> bool {
        let Some(head) = self.queue.pop_front() else {
            error!("server sent a reply with no pending request; terminating driver");
            return false;
        };
        if code == ReplyCode::Error {
            let Reply::Error(msg) = reply else {
                unreachable!("ReplyCode::Error always pairs with Reply::Error");
            };
            head.fail(Error::Server(msg.to_vec()));
            return true;
        }
        match head {
            Pending::Single(tx) => {
                let _ = tx.send(Ok(reply));
            },
            Pending::Pipeline(remaining, tx, mut acc) => {
                acc.push(reply);
                if remaining <= 1 {
                    let _ = tx.send(Ok(acc));
                } else {
                    self.queue.push_front(Pending::Pipeline(remaining - 1, tx, acc));
                }
            },
        }
        true
    }

    fn fail_all_pending(&mut self, reason: Error) {
        while let Some(pending) = self.queue.pop_front() {
            pending.fail(reason.clone());
        }
    }

    /// Disconnect/reconnect policy (spec §4.6), three cases keyed on
    /// `reconnect_sleep` and whether a cooldown is already running.
    async fn on_transport_error(&mut self, reason: Error) {
        self.fail_all_pending(reason.clone());

        match self.conn.config.reconnect_sleep {
            ReconnectSleep::NoReconnect => {
                self.conn.disconnect().await;
            },
            ReconnectSleep::Millis(ms) => {
                let cooldown_active = self
                    .reconnect_deadline
                    .is_some_and(|deadline| Instant::now() < deadline);
                self.conn.disconnect().await;

                if cooldown_active {
                    // Timer already armed: wait for it, the main loop's
                    // `sleep_until_opt` branch picks up from here.
                } else {
                    warn!(error = %reason, "connection lost, attempting immediate reconnect");
                    self.reconnect_now(ms).await;
                }
            },
        }
    }

    async fn attempt_reconnect(&mut self) {
        let ReconnectSleep::Millis(ms) = self.conn.config.reconnect_sleep else {
            return;
        };
        self.reconnect_now(ms).await;
    }

    async fn reconnect_now(&mut self, cooldown_ms: u64) {
        match bootstrap::connect_into(&mut self.conn).await {
            Ok(()) => {
                debug!("reconnected");
            },
            Err(e) => {
                warn!(error = %e, "reconnect attempt failed");
            },
        }
        self.reconnect_deadline = Some(Instant::now() + Duration::from_millis(cooldown_ms));
    }

    async fn shutdown(&mut self) {
        self.fail_all_pending(Error::Closed);
        self.conn.disconnect().await;
    }
}

async fn read_if_connected(
    socket: &mut Option<crate::transport::Transport>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match socket {
        Some(s) => s.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
