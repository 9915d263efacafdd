// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §4.7 flow control: only one `message`/`pmessage` is ever
//! in-flight to the consumer at a time; once the bounded queue fills,
//! the `drop` overflow policy discards further pushes and reports the
//! count in a single `Dropped` notice once the consumer catches up.

use resp_client_rs::{
    cfg::config::{Config, Host, QueueBehaviour, ReconnectSleep},
    pubsub::{PushEvent, SubscriptionClient},
};
use tokio::{io::AsyncWriteExt, sync::mpsc};

use crate::integration_tests::common::bind_loopback;

#[tokio::test]
async fn ack_gating_and_drop_overflow() {
    let (listener, addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        socket
            .write_all(b"*3\r\n$7\r\nmessage\r\n$2\r\nch\r\n$2\r\nm1\r\n")
            .await
            .expect("write m1");
        socket
            .write_all(b"*3\r\n$7\r\nmessage\r\n$2\r\nch\r\n$2\r\nm2\r\n")
            .await
            .expect("write m2");
        socket
            .write_all(b"*3\r\n$7\r\nmessage\r\n$2\r\nch\r\n$2\r\nm3\r\n")
            .await
            .expect("write m3 (should be dropped)");
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    });

    let config = Config {
        host: Host::Tcp(addr.ip().to_string()),
        port: addr.port(),
        reconnect_sleep: ReconnectSleep::NoReconnect,
        max_queue_size: Some(1),
        queue_behaviour: QueueBehaviour::Drop,
        ..Config::default()
    };

    let (consumer_tx, mut consumer_rx) = mpsc::unbounded_channel();
    let client = SubscriptionClient::connect(config, consumer_tx)
        .await
        .expect("connect");

    assert!(matches!(consumer_rx.recv().await, Some(PushEvent::Connected)));

    match consumer_rx.recv().await {
        Some(PushEvent::Message { channel, payload }) => {
            assert_eq!(channel, "ch");
            assert_eq!(payload, "m1");
        },
        other => panic!("expected first message, got {other:?}"),
    }

    // m2 should now be queued and m3 dropped, but neither delivered yet
    // since we haven't acked m1.
    client.ack_message().expect("ack m1");

    match consumer_rx.recv().await {
        Some(PushEvent::Message { channel, payload }) => {
            assert_eq!(channel, "ch");
            assert_eq!(payload, "m2");
        },
        other => panic!("expected second message, got {other:?}"),
    }

    client.ack_message().expect("ack m2");

    assert!(matches!(consumer_rx.recv().await, Some(PushEvent::Dropped(1))));
}
