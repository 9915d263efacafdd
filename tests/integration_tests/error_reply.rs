// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 end-to-end scenario 3: a server-sent `Error` reply is
//! delivered to the specific caller as `Error::Server` and does not
//! disconnect the client.

use resp_client_rs::{Error, Reply, cfg::config::ReconnectSleep};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::integration_tests::common::{bind_loopback, config_for};

#[tokio::test]
async fn error_reply_reaches_caller() {
    let (listener, addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 256];

        let n = socket.read(&mut buf).await.expect("read INVALID");
        assert_eq!(&buf[..n], b"*1\r\n$7\r\nINVALID\r\n");
        socket
            .write_all(b"-ERR unknown command 'INVALID'\r\n")
            .await
            .expect("write error reply");

        let n = socket.read(&mut buf).await.expect("read PING after the error");
        assert_eq!(&buf[..n], b"*1\r\n$4\r\nPING\r\n");
        socket.write_all(b"+PONG\r\n").await.expect("write PONG");
    });

    let client = resp_client_rs::CommandClient::connect(config_for(addr, ReconnectSleep::NoReconnect))
        .await
        .expect("connect");

    let result = client.request(b"*1\r\n$7\r\nINVALID\r\n".to_vec()).await;

    match result {
        Err(Error::Server(msg)) => assert_eq!(msg, b"ERR unknown command 'INVALID'"),
        other => panic!("expected Err(Error::Server(_)), got {other:?}"),
    }

    let reply = client
        .request(b"*1\r\n$4\r\nPING\r\n".to_vec())
        .await
        .expect("connection survives a server-sent error reply");
    assert_eq!(reply, Reply::SimpleString("PONG".into()));
}
