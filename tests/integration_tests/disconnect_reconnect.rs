// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 end-to-end scenario 5: mid-pipeline disconnect. The server
//! answers the first of three pipelined requests then closes; the
//! caller observes one error for the whole pipeline, and a later
//! request after the reconnect cooldown succeeds against a fresh
//! connection.

use std::time::Duration;

use resp_client_rs::{CommandClient, Reply, cfg::config::ReconnectSleep};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::integration_tests::common::{bind_loopback, config_for};

#[tokio::test]
async fn mid_pipeline_disconnect_then_reconnect() {
    let (listener, addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.expect("accept first connection");
        let mut buf = [0u8; 256];
        let _ = first.read(&mut buf).await.expect("read pipeline of 3");
        first.write_all(b"+OK\r\n").await.expect("write one reply, then drop");
        drop(first);

        let (mut second, _) = listener.accept().await.expect("accept reconnect");
        let mut buf2 = [0u8; 256];
        let n2 = second.read(&mut buf2).await.expect("read PING after reconnect");
        assert_eq!(&buf2[..n2], b"*1\r\n$4\r\nPING\r\n");
        second.write_all(b"+PONG\r\n").await.expect("write PONG");
    });

    let client = CommandClient::connect(config_for(addr, ReconnectSleep::Millis(50)))
        .await
        .expect("connect");

    let pipeline_bytes = b"*1\r\n$4\r\nPING\r\n".repeat(3);
    let result = client.pipeline(pipeline_bytes, 3).await;
    assert!(result.is_err(), "pipeline should fail as one error after the mid-stream close");

    tokio::time::sleep(Duration::from_millis(200)).await;

    let reply = client
        .request(b"*1\r\n$4\r\nPING\r\n".to_vec())
        .await
        .expect("request after reconnect should succeed against the new connection");
    assert_eq!(reply, Reply::SimpleString("PONG".into()));
}
