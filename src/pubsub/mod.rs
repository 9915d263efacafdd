// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Subscription client (C7, spec §4.7): built on the same connection
//! bootstrap and parser as [`crate::client::CommandClient`] but replaces
//! the request queue with a push model — a bounded, ack-gated queue of
//! `message`/`pmessage` events forwarded to a single consumer.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use tokio::{
    io::AsyncReadExt,
    sync::{mpsc, oneshot},
    time::{Duration, Instant},
};
use tracing::{debug, warn};

use crate::{
    cfg::config::{Config, QueueBehaviour, ReconnectSleep},
    connection::{bootstrap, state::ConnectionState},
    error::{Error, Result},
    resp::{ParseOutcome, Reply, parse},
};

const READ_CHUNK: usize = 8192;

/// A tagged event delivered to the controlling consumer (spec §4.7
/// "Incoming message types"). `Message`/`PMessage` require an
/// [`SubscriptionClient::ack_message`] before the next one is
/// delivered; every other variant does not.
#[derive(Debug, Clone)]
pub enum PushEvent {
    Message { channel: Bytes, payload: Bytes },
    PMessage { pattern: Bytes, channel: Bytes, payload: Bytes },
    Subscribed(Bytes),
    Unsubscribed(Bytes),
    Dropped(u64),
    Connected,
    Disconnected,
}

enum Ctrl {
    Subscribe(Vec<Vec<u8>>),
    Unsubscribe(Vec<Vec<u8>>),
    PSubscribe(Vec<Vec<u8>>),
    PUnsubscribe(Vec<Vec<u8>>),
    Ack,
    SetConsumer(mpsc::UnboundedSender<PushEvent>, oneshot::Sender<()>),
    Stop,
}

/// Handle callers hold; cheaply `Clone`able, wraps an `mpsc::Sender`
/// into the driver task the same way [`crate::client::CommandClient`]
/// does.
#[derive(Clone)]
pub struct SubscriptionClient {
    tx: mpsc::UnboundedSender<Ctrl>,
}

impl SubscriptionClient {
    /// Bootstrap a connection and spawn the driver task. `consumer`
    /// receives every [`PushEvent`]; a [`PushEvent::Connected`] is sent
    /// immediately once the handshake completes.
    pub async fn connect(config: Config, consumer: mpsc::UnboundedSender<PushEvent>) -> Result<Self> {
        let mut conn = ConnectionState::new(config);
        bootstrap::connect_into(&mut conn).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let reconnect_deadline = cooldown_deadline(&conn);
        let _ = consumer.send(PushEvent::Connected);

        let driver = PubSubDriver {
            conn,
            cmd_rx: rx,
            consumer,
            channels: HashSet::new(),
            patterns: HashSet::new(),
            queue: VecDeque::new(),
            dropped: 0,
            awaiting_ack: false,
            reconnect_deadline,
        };
        tokio::spawn(driver.run());
        Ok(SubscriptionClient { tx })
    }

    pub fn subscribe(&self, channels: Vec<Vec<u8>>) -> Result<()> {
        self.tx.send(Ctrl::Subscribe(channels)).map_err(|_| Error::Closed)
    }

    pub fn unsubscribe(&self, channels: Vec<Vec<u8>>) -> Result<()> {
        self.tx.send(Ctrl::Unsubscribe(channels)).map_err(|_| Error::Closed)
    }

    pub fn psubscribe(&self, patterns: Vec<Vec<u8>>) -> Result<()> {
        self.tx.send(Ctrl::PSubscribe(patterns)).map_err(|_| Error::Closed)
    }

    pub fn punsubscribe(&self, patterns: Vec<Vec<u8>>) -> Result<()> {
        self.tx.send(Ctrl::PUnsubscribe(patterns)).map_err(|_| Error::Closed)
    }

    /// Signal that the previously delivered `message`/`pmessage` has
    /// been handled, unblocking the next one.
    pub fn ack_message(&self) -> Result<()> {
        self.tx.send(Ctrl::Ack).map_err(|_| Error::Closed)
    }

    /// Transfer ownership of the push stream to a new consumer (spec
    /// §4.7 `controlling_process`). Resolves once the driver has
    /// switched over, so no message is delivered to the old consumer
    /// after this returns.
    pub async fn controlling_process(
        &self,
        consumer: mpsc::UnboundedSender<PushEvent>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let (done, rx) = oneshot::channel();
        self.tx
            .send(Ctrl::SetConsumer(consumer, done))
            .map_err(|_| Error::Closed)?;
        match timeout {
            Some(d) => tokio::time::timeout(d, rx)
                .await
                .map_err(|_| Error::Closed)?
                .map_err(|_| Error::Closed),
            None => rx.await.map_err(|_| Error::Closed),
        }
    }

    pub fn stop(&self) {
        let _ = self.tx.send(Ctrl::Stop);
    }
}

fn cooldown_deadline(conn: &ConnectionState) -> Option<Instant> {
    match conn.config.reconnect_sleep {
        ReconnectSleep::NoReconnect => None,
        ReconnectSleep::Millis(ms) => conn.connected_at.map(|at| at + Duration::from_millis(ms)),
    }
}

struct PubSubDriver {
    conn: ConnectionState,
    cmd_rx: mpsc::UnboundedReceiver<Ctrl>,
    consumer: mpsc::UnboundedSender<PushEvent>,
    channels: HashSet<Bytes>,
    patterns: HashSet<Bytes>,
    queue: VecDeque<PushEvent>,
    dropped: u64,
    awaiting_ack: bool,
    reconnect_deadline: Option<Instant>,
}

impl PubSubDriver {
    async fn run(mut self) {
        let mut read_buf = vec![0u8; READ_CHUNK];
        loop {
            let deadline = self.reconnect_deadline;
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        None | Some(Ctrl::Stop) => {
                            self.shutdown().await;
                            return;
                        },
                        Some(Ctrl::Subscribe(channels)) => self.handle_subscribe(channels).await,
                        Some(Ctrl::Unsubscribe(channels)) => self.handle_unsubscribe(channels).await,
                        Some(Ctrl::PSubscribe(patterns)) => self.handle_psubscribe(patterns).await,
                        Some(Ctrl::PUnsubscribe(patterns)) => self.handle_punsubscribe(patterns).await,
                        Some(Ctrl::Ack) => self.handle_ack(),
                        Some(Ctrl::SetConsumer(new_consumer, done)) => {
                            self.consumer = new_consumer;
                            let _ = done.send(());
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

    async fn handle_subscribe(&mut self, channels: Vec<Vec<u8>>) {
        for c in &channels {
            self.channels.insert(Bytes::from(c.clone()));
        }
        if self.conn.is_connected() {
            let cmd = encode_command("SUBSCRIBE", &channels);
            self.send_or_error(&cmd).await;
        }
    }

    async fn handle_unsubscribe(&mut self, channels: Vec<Vec<u8>>) {
        for c in &channels {
            self.channels.remove(c.as_slice());
        }
        if self.conn.is_connected() {
            let cmd = encode_command("UNSUBSCRIBE", &channels);
            self.send_or_error(&cmd).await;
        }
    }

    async fn handle_psubscribe(&mut self, patterns: Vec<Vec<u8>>) {
        for p in &patterns {
            self.patterns.insert(Bytes::from(p.clone()));
        }
        if self.conn.is_connected() {
            let cmd = encode_command("PSUBSCRIBE", &patterns);
            self.send_or_error(&cmd).await;
        }
    }

    async fn handle_punsubscribe(&mut self, patterns: Vec<Vec<u8>>) {
        for p in &patterns {
            self.patterns.remove(p.as_slice());
        }
        if self.conn.is_connected() {
            let cmd = encode_command("PUNSUBSCRIBE", &patterns);
            self.send_or_error(&cmd).await;
        }
    }

    async fn send_or_error(&mut self, cmd: &[u8]) {
        let Some(socket) = self.conn.socket.as_mut() else {
            return;
        };
        if let Err(e) = socket.send(cmd).await {
            self.on_transport_error(Error::from(e)).await;
        }
    }

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
        let mut leftover: Option<Bytes> = None;
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
                Ok(ParseOutcome::Value { reply, code: _, leftover: tail, state }) => {
                    self.conn.parser = state;
                    if !self.interpret_push(reply) {
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

    /// Returns `false` only when the `exit` overflow policy just
    /// terminated the driver.
    fn interpret_push(&mut self, reply: Reply) -> bool {
        let Reply::Array(elements) = reply else {
            warn!("ignoring non-array push message");
            return true;
        };
        let Some(tag) = elements.first().and_then(as_bulk) else {
            return true;
        };
        match tag.as_ref() {
            b"subscribe" => {
                if let Some(channel) = elements.get(1).and_then(as_bulk) {
                    let _ = self.consumer.send(PushEvent::Subscribed(channel));
                }
                true
            },
            b"psubscribe" => {
                if let Some(pattern) = elements.get(1).and_then(as_bulk) {
                    let _ = self.consumer.send(PushEvent::Subscribed(pattern));
                }
                true
            },
            b"unsubscribe" => {
                if let Some(channel) = elements.get(1).and_then(as_bulk) {
                    let _ = self.consumer.send(PushEvent::Unsubscribed(channel));
                }
                true
            },
            b"punsubscribe" => {
                if let Some(pattern) = elements.get(1).and_then(as_bulk) {
                    let _ = self.consumer.send(PushEvent::Unsubscribed(pattern));
                }
                true
            },
            b"message" => match (elements.get(1).and_then(as_bulk), elements.get(2).and_then(as_bulk)) {
                (Some(channel), Some(payload)) => self.enqueue_push(PushEvent::Message { channel, payload }),
                _ => true,
            },
            b"pmessage" => match (
                elements.get(1).and_then(as_bulk),
                elements.get(2).and_then(as_bulk),
                elements.get(3).and_then(as_bulk),
            ) {
                (Some(pattern), Some(channel), Some(payload)) => {
                    self.enqueue_push(PushEvent::PMessage { pattern, channel, payload })
                },
                _ => true,
            },
            other => {
                warn!(tag = %String::from_utf8_lossy(other), "unrecognized push message");
                true
            },
        }
    }

    /// Bounded-queue admission and overflow policy (spec §4.7
    /// "Overflow"). Returns `false` under the `exit` policy, signaling
    /// the driver to terminate.
    fn enqueue_push(&mut self, event: PushEvent) -> bool {
        let at_capacity = self
            .conn
            .config
            .max_queue_size
            .is_some_and(|max| self.queue.len() >= max);
        if at_capacity {
            match self.conn.config.queue_behaviour {
                QueueBehaviour::Drop => {
                    self.dropped += 1;
                    true
                },
                QueueBehaviour::Exit => {
                    let _ = self.consumer.send(PushEvent::Disconnected);
                    false
                },
            }
        } else {
            self.queue.push_back(event);
            self.try_deliver();
            true
        }
    }

    fn try_deliver(&mut self) {
        if !self.awaiting_ack {
            if let Some(event) = self.queue.pop_front() {
                self.awaiting_ack = true;
                let _ = self.consumer.send(event);
            }
        }
    }

    /// `ack_message` (spec §4.7 "Flow control"): clears the gate and
    /// delivers the next queued event if any; if the queue just
    /// drained to empty and messages were dropped, flush a single
    /// `Dropped` notice instead.
    fn handle_ack(&mut self) {
        self.awaiting_ack = false;
        if let Some(event) = self.queue.pop_front() {
            self.awaiting_ack = true;
            let _ = self.consumer.send(event);
        } else if self.dropped > 0 {
            let n = std::mem::take(&mut self.dropped);
            let _ = self.consumer.send(PushEvent::Dropped(n));
        }
    }

    async fn on_transport_error(&mut self, reason: Error) {
        let _ = self.consumer.send(PushEvent::Disconnected);
        debug!(error = %reason, "pubsub connection lost");

        match self.conn.config.reconnect_sleep {
            ReconnectSleep::NoReconnect => {
                self.conn.disconnect().await;
            },
            ReconnectSleep::Millis(ms) => {
                let cooldown_active = self.reconnect_deadline.is_some_and(|d| Instant::now() < d);
                self.conn.disconnect().await;
                if !cooldown_active {
                    warn!("pubsub reconnecting immediately");
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
            Ok(()) => match self.replay_subscriptions().await {
                Ok(()) => {
                    let _ = self.consumer.send(PushEvent::Connected);
                },
                Err(e) => warn!(error = %e, "resubscription after reconnect failed"),
            },
            Err(e) => warn!(error = %e, "pubsub reconnect attempt failed"),
        }
        self.reconnect_deadline = Some(Instant::now() + Duration::from_millis(cooldown_ms));
    }

    /// Replays the tracked subscribe/psubscribe sets to a freshly
    /// bootstrapped connection before announcing `Connected` (spec
    /// §4.7 "Resubscription").
    async fn replay_subscriptions(&mut self) -> Result<()> {
        if self.channels.is_empty() && self.patterns.is_empty() {
            return Ok(());
        }
        let channels: Vec<Vec<u8>> = self.channels.iter().map(|b| b.to_vec()).collect();
        let patterns: Vec<Vec<u8>> = self.patterns.iter().map(|b| b.to_vec()).collect();
        let Some(socket) = self.conn.socket.as_mut() else {
            return Ok(());
        };
        if !channels.is_empty() {
            socket.send(&encode_command("SUBSCRIBE", &channels)).await.map_err(Error::from)?;
        }
        if !patterns.is_empty() {
            socket.send(&encode_command("PSUBSCRIBE", &patterns)).await.map_err(Error::from)?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = self.consumer.send(PushEvent::Disconnected);
        self.conn.disconnect().await;
    }
}

fn as_bulk(reply: &Reply) -> Option<Bytes> {
    match reply {
        Reply::BulkString(b) => Some(b.clone()),
        _ => None,
    }
}

fn encode_command(verb: &str, args: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(format!("*{}\r\n", 1 + args.len()).as_bytes());
    bulk(&mut buf, verb.as_bytes());
    for a in args {
        bulk(&mut buf, a);
    }
    buf
}

fn bulk(buf: &mut Vec<u8>, part: &[u8]) {
    buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
    buf.extend_from_slice(part);
    buf.extend_from_slice(b"\r\n");
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
