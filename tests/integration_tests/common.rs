// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{net::SocketAddr, time::Duration};

use resp_client_rs::{
    Config,
    cfg::config::{Host, ReconnectSleep},
};
use tokio::net::TcpListener;

/// A bare config pointed at `addr`: no TLS, no credentials, database 0,
/// so [`resp_client_rs::connection::bootstrap::connect`] goes straight
/// from TCP dial to steady state without any handshake bytes on the
/// wire — the scripted servers below only ever need to answer the
/// commands a test actually submits.
pub fn config_for(addr: SocketAddr, reconnect_sleep: ReconnectSleep) -> Config {
    Config {
        host: Host::Tcp(addr.ip().to_string()),
        port: addr.port(),
        connect_timeout: Duration::from_millis(2000),
        reconnect_sleep,
        ..Config::default()
    }
}

pub async fn bind_loopback() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
    let addr = listener.local_addr().expect("local_addr");
    (listener, addr)
}

/// A loopback address nothing listens on, for the "connection refused"
/// scenario — bind then immediately drop the listener.
pub async fn refused_addr() -> SocketAddr {
    let (listener, addr) = bind_loopback().await;
    drop(listener);
    addr
}
