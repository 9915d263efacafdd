// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Address resolver (C3, spec §4.3): host/UDS path → ordered,
//! de-duplicated address list, IPv6 preferred.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

use anyhow::{Context, Result};

use crate::cfg::config::Host;

/// A resolved dial target: a TCP socket address or a unix-domain path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

/// Resolve `host`/`port` to a de-duplicated, discovery-ordered address
/// list. Literal IP addresses short-circuit DNS entirely. A
/// [`Host::Unix`] path yields exactly one address with port forced to
/// 0, matching spec §4.3.
pub async fn resolve(host: &Host, port: u16) -> Result<Vec<Address>> {
    match host {
        Host::Unix(path) => Ok(vec![Address::Unix(path.clone())]),
        Host::Tcp(name) => {
            if let Ok(ip) = name.parse::<IpAddr>() {
                return Ok(vec![Address::Tcp(SocketAddr::new(ip, port))]);
            }
            resolve_dns(name, port).await
        },
    }
}

async fn resolve_dns(name: &str, port: u16) -> Result<Vec<Address>> {
    let resolved: Vec<SocketAddr> = tokio::net::lookup_host((name, port))
        .await
        .with_context(|| format!("failed to resolve host {name}"))?
        .collect();

    // IPv6 first, then IPv4 — the in-order, name-service-preserving
    // fallback order a caller walks when dialing.
    let mut v6: Vec<SocketAddr> = Vec::new();
    let mut v4: Vec<SocketAddr> = Vec::new();
    for addr in resolved {
        if addr.is_ipv6() {
            v6.push(addr);
        } else {
            v4.push(addr);
        }
    }

    let mut ordered = Vec::with_capacity(v6.len() + v4.len());
    ordered.extend(v6);
    ordered.extend(v4);
    dedup_in_place(&mut ordered);

    Ok(ordered.into_iter().map(Address::Tcp).collect())
}

/// Remove duplicates without sorting, so the caller's fallback order
/// still matches name-service order.
fn dedup_in_place(addrs: &mut Vec<SocketAddr>) {
    let mut seen = std::collections::HashSet::with_capacity(addrs.len());
    addrs.retain(|a| seen.insert(*a));
}
