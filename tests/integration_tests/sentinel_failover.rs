// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Spec §8 end-to-end scenario 6: the first monitor endpoint refuses
//! the connection, the second names the master, and bootstrap proceeds
//! against the discovered address.

use resp_client_rs::{
    CommandClient, Reply,
    cfg::config::{Config, Host, ReconnectSleep, SentinelConfig},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::integration_tests::common::{bind_loopback, refused_addr};

#[tokio::test]
async fn sentinel_fails_over_to_second_monitor() {
    let refused = refused_addr().await;
    let (monitor_listener, monitor_addr) = bind_loopback().await;
    let (master_listener, master_addr) = bind_loopback().await;

    tokio::spawn(async move {
        let (mut socket, _) = monitor_listener.accept().await.expect("accept sentinel query");
        let mut buf = [0u8; 256];
        let n = socket.read(&mut buf).await.expect("read SENTINEL command");
        assert!(buf[..n].starts_with(b"*3\r\n$8\r\nSENTINEL\r\n"));

        let host = master_addr.ip().to_string();
        let port = master_addr.port().to_string();
        let reply = format!(
            "*2\r\n${}\r\n{}\r\n${}\r\n{}\r\n",
            host.len(),
            host,
            port.len(),
            port
        );
        socket.write_all(reply.as_bytes()).await.expect("write master address");
    });

    tokio::spawn(async move {
        let (mut socket, _) = master_listener.accept().await.expect("accept master connection");
        let mut buf = [0u8; 256];
        let n = socket.read(&mut buf).await.expect("read PING");
        assert_eq!(&buf[..n], b"*1\r\n$4\r\nPING\r\n");
        socket.write_all(b"+PONG\r\n").await.expect("write PONG");
    });

    let config = Config {
        sentinel: Some(SentinelConfig {
            master_group: "mymaster".to_owned(),
            endpoints: vec![
                (Host::Tcp(refused.ip().to_string()), refused.port()),
                (Host::Tcp(monitor_addr.ip().to_string()), monitor_addr.port()),
            ],
        }),
        reconnect_sleep: ReconnectSleep::NoReconnect,
        ..Config::default()
    };

    let client = CommandClient::connect(config).await.expect("connect via sentinel failover");

    let reply = client.request(b"*1\r\n$4\r\nPING\r\n".to_vec()).await.expect("request");
    assert_eq!(reply, Reply::SimpleString("PONG".into()));
}
