// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Connection bootstrap (C5, spec §4.5): resolve → dial → TLS upgrade
//! → AUTH → SELECT, with address fallback.

use std::time::Duration;

use tokio::net::{TcpStream, UnixStream};
use tracing::debug;

use crate::{
    cfg::{
        config::{Config, Host, TlsConfig},
        credentials::Credentials,
    },
    connection::state::ConnectionState,
    error::{Error, Result},
    resp::{ParseOutcome, ParserState, Reply, parse},
    sentinel,
    transport::{
        Transport,
        resolver::{self, Address},
        tls,
    },
};

/// Run the full bootstrap sequence and hand back a connected,
/// handshaken transport. Does not mutate `state` beyond what callers
/// do via [`ConnectionState::mark_connected`] — kept as a free function
/// so it can be retried without an existing `ConnectionState` (e.g. a
/// bare probe) as well as from the driver's reconnect path.
pub async fn connect(config: &Config) -> Result<Transport> {
    let (dial_host, dial_port) = target_endpoint(config).await?;

    let addrs = resolver::resolve(&dial_host, dial_port)
        .await
        .map_err(|e| Error::Connection(e.to_string()))?;
    if addrs.is_empty() {
        return Err(Error::Connection("address resolution returned nothing".into()));
    }

    let mut transport = dial_any(&addrs, config.connect_timeout).await?;
    let _ = transport.set_nodelay(config.socket_options.nodelay);

    if let Some(tls_cfg) = &config.tls {
        let default_name = match &dial_host {
            Host::Tcp(name) => name.clone(),
            Host::Unix(_) => String::new(),
        };
        transport = upgrade_tls(transport, tls_cfg, &default_name, config.connect_timeout).await?;
    }

    if !config.credentials.is_empty() {
        authenticate(&mut transport, &config.credentials, config.connect_timeout).await?;
    }

    if config.database != 0 {
        select_database(&mut transport, config.database, config.connect_timeout).await?;
    }

    Ok(transport)
}

/// Convenience wrapper that also updates a driver's
/// [`ConnectionState`] on success.
pub async fn connect_into(state: &mut ConnectionState) -> Result<()> {
    let transport = connect(&state.config).await?;
    state.mark_connected(transport);
    Ok(())
}

async fn target_endpoint(config: &Config) -> Result<(Host, u16)> {
    match &config.sentinel {
        Some(s) => {
            let (host, port) =
                sentinel::resolve_master(&s.master_group, &s.endpoints, config.connect_timeout)
                    .await?;
            Ok((Host::Tcp(host), port))
        },
        None => Ok((config.host.clone(), config.port)),
    }
}

async fn dial_any(addrs: &[Address], timeout: Duration) -> Result<Transport> {
    let mut last_err = None;
    for addr in addrs {
        match dial_one(addr, timeout).await {
            Ok(transport) => return Ok(transport),
            Err(e) => {
                debug!(?addr, error = %e, "dial attempt failed, trying next address");
                last_err = Some(e);
            },
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Connection("no addresses to dial".into())))
}

async fn dial_one(addr: &Address, timeout: Duration) -> Result<Transport> {
    match addr {
        Address::Tcp(sock) => {
            let stream = tokio::time::timeout(timeout, TcpStream::connect(sock))
                .await
                .map_err(|_| Error::Connection(format!("connect to {sock} timed out")))?
                .map_err(|e| Error::Connection(e.to_string()))?;
            Ok(Transport::Plain(stream))
        },
        Address::Unix(path) => {
            let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
                .await
                .map_err(|_| Error::Connection(format!("connect to {} timed out", path.display())))?
                .map_err(|e| Error::Connection(e.to_string()))?;
            Ok(Transport::Unix(stream))
        },
    }
}

async fn upgrade_tls(
    transport: Transport,
    tls_cfg: &TlsConfig,
    default_name: &str,
    timeout: Duration,
) -> Result<Transport> {
    match transport {
        Transport::Plain(stream) => {
            let tls_stream = tls::upgrade(stream, tls_cfg, default_name, timeout)
                .await
                .map_err(|e| Error::TlsUpgrade(e.to_string()))?;
            Ok(Transport::Tls(Box::new(tls_stream)))
        },
        _ => Err(Error::TlsUpgrade("tls is only supported over a TCP transport".into())),
    }
}

async fn authenticate(transport: &mut Transport, creds: &Credentials, timeout: Duration) -> Result<()> {
    let Some(auth) = creds.encode() else {
        return Ok(());
    };
    transport.send(auth.as_bytes()).await?;
    expect_ok(transport, timeout).await.map_err(|e| match e {
        Error::UnexpectedResponse(bytes) => {
            Error::Authentication(String::from_utf8_lossy(&bytes).into_owned())
        },
        other => Error::Authentication(other.to_string()),
    })
}

async fn select_database(transport: &mut Transport, db: u32, timeout: Duration) -> Result<()> {
    let cmd = format!("SELECT {db}\r\n");
    transport.send(cmd.as_bytes()).await?;
    expect_ok(transport, timeout).await.map_err(|e| match e {
        Error::UnexpectedResponse(bytes) => Error::Select(String::from_utf8_lossy(&bytes).into_owned()),
        other => Error::Select(other.to_string()),
    })
}

/// Passive recv loop (spec §4.2 `ActiveMode::Passive`) used only during
/// the handshake: blocks until one RESP value arrives and checks it's a
/// literal `+OK`.
async fn expect_ok(transport: &mut Transport, timeout: Duration) -> Result<()> {
    let mut state = ParserState::idle();
    let mut buf = [0u8; 512];
    loop {
        let n = transport.recv(&mut buf, timeout).await?;
        if n == 0 {
            return Err(Error::Closed);
        }
        match parse(state, &buf[..n]).map_err(|e| Error::Io(e.to_string()))? {
            ParseOutcome::Continue(next) => state = next,
            ParseOutcome::Value { reply, .. } => {
                return match reply {
                    Reply::SimpleString(ref s) if s.as_ref() == b"OK" => Ok(()),
                    Reply::Error(msg) => Err(Error::UnexpectedResponse(msg.to_vec())),
                    other => Err(Error::UnexpectedResponse(format!("{other:?}").into_bytes())),
                };
            },
        }
    }
}
