// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 multiplexer invariant: with `reconnect_sleep = no_reconnect`,
//! a transport failure delivers exactly one error to every caller with
//! a request in flight, and the driver terminates rather than retrying.

use resp_client_rs::cfg::config::ReconnectSleep;
use tokio::io::AsyncReadExt;

use crate::integration_tests::common::{bind_loopback, config_for};

#[tokio::test]
async fn no_reconnect_fails_every_pending_caller_once() {
    let (listener, addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 256];
        // Read whatever the three concurrent requests put on the wire,
        // then close without ever replying.
        let _ = socket.read(&mut buf).await.expect("read requests");
        drop(socket);
    });

    let client = resp_client_rs::CommandClient::connect(config_for(addr, ReconnectSleep::NoReconnect))
        .await
        .expect("connect");

    let a = client.request(b"*1\r\n$4\r\nPING\r\n".to_vec());
    let b = client.request(b"*1\r\n$4\r\nPING\r\n".to_vec());
    let c = client.request(b"*1\r\n$4\r\nPING\r\n".to_vec());

    let (ra, rb, rc) = tokio::join!(a, b, c);
    assert!(ra.is_err());
    assert!(rb.is_err());
    assert!(rc.is_err());

    // The driver has torn down the connection and won't reconnect; a
    // further request observes there is no connection to submit to.
    let after = client.request(b"*1\r\n$4\r\nPING\r\n".to_vec()).await;
    assert!(after.is_err());
}
