// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 end-to-end scenario 2: pipeline of SET + GET.

use resp_client_rs::{CommandClient, Reply, cfg::config::ReconnectSleep};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::integration_tests::common::{bind_loopback, config_for};

#[tokio::test]
async fn pipeline_set_then_get() {
    let (listener, addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 256];
        let n = socket.read(&mut buf).await.expect("read pipeline");
        assert_eq!(
            &buf[..n],
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"
        );
        socket.write_all(b"+OK\r\n$1\r\nv\r\n").await.expect("write replies");
    });

    let client = CommandClient::connect(config_for(addr, ReconnectSleep::NoReconnect))
        .await
        .expect("connect");

    let replies = client
        .pipeline(
            b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n*2\r\n$3\r\nGET\r\n$1\r\nk\r\n".to_vec(),
            2,
        )
        .await
        .expect("pipeline");

    assert_eq!(
        replies,
        vec![Reply::SimpleString("OK".into()), Reply::BulkString("v".into())]
    );
}
