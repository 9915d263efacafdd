// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The error taxonomy a caller can match on.
//!
//! Internal plumbing (bootstrap, state-machine helpers) keeps using
//! `anyhow::Result` the way the teacher's state machines do; this enum is
//! reserved for the seams callers actually observe — submit/reply and
//! `connect`.

use thiserror::Error;

/// Failures observable by a caller of [`crate::client::CommandClient`],
/// [`crate::pubsub::SubscriptionClient`] or [`crate::connection::bootstrap::connect`].
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// `request`/`pipeline` submitted while no socket is established.
    #[error("no connection")]
    NoConnection,

    /// All addresses in the resolved list failed to accept a TCP dial.
    #[error("connection error: {0}")]
    Connection(String),

    /// TLS handshake failed after a successful TCP dial.
    #[error("failed to upgrade to tls: {0}")]
    TlsUpgrade(String),

    /// AUTH did not return `+OK`.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// SELECT did not return `+OK`.
    #[error("select error: {0}")]
    Select(String),

    /// A handshake step returned something other than `+OK`.
    #[error("unexpected response: {0:?}")]
    UnexpectedResponse(Vec<u8>),

    /// Peer closed the connection.
    #[error("closed")]
    Closed,

    /// Transport-level I/O failure outside the handshake.
    #[error("io error: {0}")]
    Io(String),

    /// The server sent a reply while no request was pending. Fatal:
    /// indicates a framing bug, not a recoverable condition.
    #[error("empty queue")]
    EmptyQueue,

    /// Subscription push queue exceeded `max_queue_size` under the
    /// `exit` overflow policy.
    #[error("max queue size exceeded")]
    MaxQueueSize,

    /// Every sentinel monitor endpoint failed to name a master.
    #[error("no master")]
    NoMaster,

    /// A server-sent `Error` reply, delivered to the specific caller.
    /// Does not disconnect the client.
    #[error("server error: {}", String::from_utf8_lossy(.0))]
    Server(Vec<u8>),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
