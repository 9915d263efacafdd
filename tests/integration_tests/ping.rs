// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 end-to-end scenario 1: PING round-trip.

use resp_client_rs::{CommandClient, Reply, cfg::config::ReconnectSleep};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::integration_tests::common::{bind_loopback, config_for};

#[tokio::test]
async fn ping_round_trip() {
    let (listener, addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 256];
        let n = socket.read(&mut buf).await.expect("read PING");
        assert_eq!(&buf[..n], b"*1\r\n$4\r\nPING\r\n");
        socket.write_all(b"+PONG\r\n").await.expect("write PONG");
    });

    let client = CommandClient::connect(config_for(addr, ReconnectSleep::NoReconnect))
        .await
        .expect("connect");

    let reply = client.request(b"*1\r\n$4\r\nPING\r\n".to_vec()).await.expect("request");
    assert_eq!(reply, Reply::SimpleString("PONG".into()));
}
