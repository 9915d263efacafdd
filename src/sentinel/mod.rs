// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Sentinel resolver (C4, spec §4.4): query a pool of monitor nodes to
//! discover the current master endpoint before bootstrapping a
//! connection. Reuses the core RESP parser; everything else (the
//! inline `SENTINEL get-master-addr-by-name` command) is local to this
//! module, matching spec §1 ("the parser for the sentinel text
//! protocol subset is included only insofar as it reuses the core RESP
//! parser").
//!
//! Not cached across reconnects — resolved once per bootstrap attempt,
//! so master failover is rediscovered on every reconnect.

use std::time::Duration;

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tracing::debug;

use crate::{
    cfg::config::Host,
    error::{Error, Result},
    resp::{ParseOutcome, ParserState, Reply, ReplyCode, parse},
    transport::resolver::{self, Address},
};

fn encode_sentinel_command(master_group: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + master_group.len());
    buf.extend_from_slice(b"*3\r\n");
    for part in ["SENTINEL", "get-master-addr-by-name", master_group] {
        buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
        buf.extend_from_slice(part.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Query each monitor endpoint in order until one names a master.
/// Connection refused, timeout, `NilArray` (no such group), and
/// `Error` replies all move on to the next endpoint; if all fail,
/// returns [`Error::NoMaster`].
pub async fn resolve_master(
    master_group: &str,
    endpoints: &[(Host, u16)],
    connect_timeout: Duration,
) -> Result<(String, u16)> {
    for (host, port) in endpoints {
        match query_one(host, *port, master_group, connect_timeout).await {
            Ok(Some(master)) => return Ok(master),
            Ok(None) => {
                debug!(?host, port, "sentinel: no such master group");
            },
            Err(e) => {
                debug!(?host, port, error = %e, "sentinel: endpoint failed");
            },
        }
    }
    Err(Error::NoMaster)
}

async fn query_one(
    host: &Host,
    port: u16,
    master_group: &str,
    timeout: Duration,
) -> Result<Option<(String, u16)>> {
    let addrs = resolver::resolve(host, port)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;

    let mut stream = None;
    for addr in addrs {
        let Address::Tcp(sock) = addr else {
            continue; // sentinel queries are plain TCP only, per spec Non-goals.
        };
        match tokio::time::timeout(timeout, TcpStream::connect(sock)).await {
            Ok(Ok(s)) => {
                stream = Some(s);
                break;
            },
            _ => continue,
        }
    }
    let mut stream = stream.ok_or_else(|| Error::Connection("all addresses refused".into()))?;

    stream
        .write_all(&encode_sentinel_command(master_group))
        .await?;

    let mut parser_state = ParserState::idle();
    let mut buf = [0u8; 4096];
    loop {
        let n = tokio::time::timeout(timeout, stream.read(&mut buf))
            .await
            .map_err(|_| Error::Io("sentinel recv timed out".into()))??;
        if n == 0 {
            return Err(Error::Closed);
        }
        match parse(parser_state, &buf[..n]).map_err(|e| Error::Io(e.to_string()))? {
            ParseOutcome::Continue(state) => parser_state = state,
            ParseOutcome::Value { reply, code, .. } => return extract_master(reply, code),
        }
    }
}

fn extract_master(reply: Reply, code: ReplyCode) -> Result<Option<(String, u16)>> {
    if code == ReplyCode::Error {
        let Reply::Error(msg) = reply else {
            unreachable!("ReplyCode::Error only produced for Reply::Error");
        };
        return Err(Error::Server(msg.to_vec()));
    }

    match reply {
        Reply::NilArray => Ok(None),
        Reply::Array(elements) if elements.len() == 2 => {
            let host = bulk_string(&elements[0])?;
            let port_str = bulk_string(&elements[1])?;
            let port = port_str
                .parse::<u16>()
                .map_err(|_| Error::Io(format!("sentinel sent a non-numeric port: {port_str}")))?;
            Ok(Some((host, port)))
        },
        other => Err(Error::Io(format!("unexpected sentinel reply shape: {other:?}"))),
    }
}

fn bulk_string(reply: &Reply) -> Result<String> {
    match reply {
        Reply::BulkString(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(Error::Io(format!("expected bulk string, got {other:?}"))),
    }
}
