// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cfg::credentials::Credentials;

/// `host` config key (spec §6): a DNS name/IP literal, or a unix-domain
/// socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Tcp(String),
    Unix(PathBuf),
}

impl Default for Host {
    fn default() -> Self {
        Host::Tcp("localhost".to_owned())
    }
}

/// `reconnect_sleep` config key: a cooldown in milliseconds, or
/// `no_reconnect` to disable reconnection entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectSleep {
    NoReconnect,
    Millis(u64),
}

impl Default for ReconnectSleep {
    fn default() -> Self {
        ReconnectSleep::Millis(100)
    }
}

/// `socket_options` config key: TCP options merged over platform
/// defaults.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SocketOptions {
    #[serde(default = "default_true")]
    pub nodelay: bool,
    #[serde(default)]
    pub keepalive: Option<Duration>,
}

fn default_true() -> bool {
    true
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: None,
        }
    }
}

/// `tls` config key. `None` disables TLS; `Some` carries the parameters
/// needed to perform the upgrade in §4.5 step 4.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// SNI / certificate-verification name; defaults to the configured
    /// host when `None` and `host` is a DNS name.
    pub server_name: Option<String>,
    /// Skip certificate verification. Off by default; only meant for
    /// talking to servers with self-signed certificates in test
    /// environments.
    pub insecure_skip_verify: bool,
}

/// `sentinel` config key: the auxiliary monitor pool used to discover
/// the current master endpoint (spec §4.4).
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub master_group: String,
    pub endpoints: Vec<(Host, u16)>,
}

/// `queue_behaviour` config key, C7 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueBehaviour {
    Drop,
    Exit,
}

impl Default for QueueBehaviour {
    fn default() -> Self {
        QueueBehaviour::Drop
    }
}

/// The full configuration mapping from spec §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: Host,
    pub port: u16,
    pub database: u32,
    pub credentials: Credentials,
    pub reconnect_sleep: ReconnectSleep,
    pub connect_timeout: Duration,
    pub socket_options: SocketOptions,
    pub tls: Option<TlsConfig>,
    pub sentinel: Option<SentinelConfig>,
    pub name: Option<String>,
    /// C7 only; `None` means `infinity`.
    pub max_queue_size: Option<usize>,
    /// C7 only.
    pub queue_behaviour: QueueBehaviour,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Host::default(),
            port: 6379,
            database: 0,
            credentials: Credentials::default(),
            reconnect_sleep: ReconnectSleep::default(),
            connect_timeout: Duration::from_millis(5000),
            socket_options: SocketOptions::default(),
            tls: None,
            sentinel: None,
            name: None,
            max_queue_size: None,
            queue_behaviour: QueueBehaviour::default(),
        }
    }
}

/// On-disk representation used by [`Config::load_from_file`]. Only the
/// fields that are meaningfully serde-friendly (no suppliers, no TLS
/// verifier objects) are exposed this way; richer configuration is
/// built programmatically via direct struct construction.
#[derive(Debug, Deserialize, Serialize)]
struct ConfigFile {
    #[serde(default)]
    host: String,
    #[serde(default)]
    unix_path: Option<String>,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    database: u32,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    reconnect_sleep: ReconnectSleep,
    #[serde(default = "default_connect_timeout_ms")]
    connect_timeout_ms: u64,
    #[serde(default)]
    socket_options: SocketOptions,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    max_queue_size: Option<usize>,
    #[serde(default)]
    queue_behaviour: QueueBehaviour,
}

fn default_port() -> u16 {
    6379
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Load the subset of configuration that is representable as plain
    /// data (no credential suppliers, no sentinel, no TLS parameters)
    /// from a YAML file, mirroring the teacher's
    /// `Config::load_from_file` workflow.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;

        let host = match raw.unix_path {
            Some(p) => Host::Unix(PathBuf::from(p)),
            None => Host::Tcp(if raw.host.is_empty() {
                "localhost".to_owned()
            } else {
                raw.host
            }),
        };

        Ok(Config {
            host,
            port: raw.port,
            database: raw.database,
            credentials: Credentials {
                username: raw.username.map(crate::cfg::credentials::Credential::from_str),
                password: raw.password.map(crate::cfg::credentials::Credential::from_str),
            },
            reconnect_sleep: raw.reconnect_sleep,
            connect_timeout: Duration::from_millis(raw.connect_timeout_ms),
            socket_options: raw.socket_options,
            tls: None,
            sentinel: None,
            name: raw.name,
            max_queue_size: raw.max_queue_size,
            queue_behaviour: raw.queue_behaviour,
        })
    }
}
