// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Structured logging init, trimmed from the teacher's
//! `cfg::logger::init_logger` down to what a library (rather than a
//! standalone CLI) needs: no YAML config file layer, just an
//! `EnvFilter` directive string. Consumers who want the full file/JSON
//! stack are expected to install their own `tracing_subscriber`
//! subscriber; this is only the convenience path used by this crate's
//! own examples and tests.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs a global `tracing` subscriber writing to stderr.
///
/// `directive` is an `EnvFilter` string, e.g. `"resp_client_rs=debug"`.
/// Returns a [`WorkerGuard`] that must be kept alive for the life of the
/// process; dropping it flushes and detaches the non-blocking writer.
pub fn init(directive: &str) -> Result<WorkerGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    let env_filter = EnvFilter::try_new(directive)
        .or_else(|_| EnvFilter::try_from_default_env())
        .context("failed to parse log directive")?;

    let subscriber = fmt()
        .with_writer(writer)
        .with_env_filter(env_filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set global default subscriber")?;

    Ok(guard)
}
