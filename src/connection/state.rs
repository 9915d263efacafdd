// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The record the single-threaded driver owns for the life of a
//! connection (spec §3 "Connection state"). Mutated only by the
//! driver task; never shared.

use tokio::time::Instant;

use crate::{cfg::config::Config, resp::ParserState, transport::Transport};

/// Owned exclusively by the driver task. `socket` and `parser` are
/// `None`/idle while disconnected; `connected_at` resolves the open
/// question in spec §9 about reconnect-storm avoidance after a late
/// TLS failure — rather than pre-arming a timer, the reconnect handler
/// derives a cooldown deadline from this timestamp on every successful
/// connect (see `client::command::Driver::reconnect_deadline`).
pub struct ConnectionState {
    pub config: Config,
    pub socket: Option<Transport>,
    pub parser: ParserState,
    pub connected_at: Option<Instant>,
}

impl ConnectionState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            socket: None,
            parser: ParserState::idle(),
            connected_at: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    pub fn mark_connected(&mut self, socket: Transport) {
        self.socket = Some(socket);
        self.connected_at = Some(Instant::now());
        self.parser = ParserState::idle();
    }

    pub async fn disconnect(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
        }
        self.parser = ParserState::idle();
    }
}
