// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Deferred credentials (spec §3, §9 "Deferred credentials").
//!
//! Username and password are each either absent, a byte string, or a
//! zero-argument supplier invoked only at AUTH time, so secret material
//! never has to sit in `Config` (and therefore never shows up in a
//! `Debug` dump of it).

use std::{fmt, sync::Arc};

/// A credential value: a literal byte string, or a supplier called once
/// per AUTH attempt.
#[derive(Clone)]
pub enum Credential {
    Bytes(Vec<u8>),
    Supplier(Arc<dyn Fn() -> Vec<u8> + Send + Sync>),
}

impl Credential {
    pub fn from_str(s: impl Into<String>) -> Self {
        Credential::Bytes(s.into().into_bytes())
    }

    pub fn from_supplier<F>(f: F) -> Self
    where F: Fn() -> Vec<u8> + Send + Sync + 'static {
        Credential::Supplier(Arc::new(f))
    }

    fn resolve(&self) -> Vec<u8> {
        match self {
            Credential::Bytes(b) => b.clone(),
            Credential::Supplier(f) => f(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Username/password pair as configured. Resolved into wire bytes only
/// at AUTH time by [`Credentials::encode`].
#[derive(Clone, Default, Debug)]
pub struct Credentials {
    pub username: Option<Credential>,
    pub password: Option<Credential>,
}

/// The encoded `*N\r\n$len\r\n...` AUTH request, built once per AUTH
/// attempt and never printed.
#[derive(Clone)]
pub struct AuthBytes(pub(crate) Vec<u8>);

impl fmt::Debug for AuthBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthBytes(<redacted>)")
    }
}

impl AuthBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

fn bulk(buf: &mut Vec<u8>, part: &[u8]) {
    buf.extend_from_slice(format!("${}\r\n", part.len()).as_bytes());
    buf.extend_from_slice(part);
    buf.extend_from_slice(b"\r\n");
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    /// Build the AUTH request bytes per spec §6:
    /// `AUTH <password>` or `AUTH <username> <password>`.
    pub fn encode(&self) -> Option<AuthBytes> {
        if self.is_empty() {
            return None;
        }
        let password = self
            .password
            .as_ref()
            .map(Credential::resolve)
            .unwrap_or_default();

        let mut buf = Vec::with_capacity(64);
        match &self.username {
            Some(username) => {
                let username = username.resolve();
                buf.extend_from_slice(b"*3\r\n");
                bulk(&mut buf, b"AUTH");
                bulk(&mut buf, &username);
                bulk(&mut buf, &password);
            },
            None => {
                buf.extend_from_slice(b"*2\r\n");
                bulk(&mut buf, b"AUTH");
                bulk(&mut buf, &password);
            },
        }
        Some(AuthBytes(buf))
    }
}
