// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A pure-Rust, non-blocking client for RESP-speaking in-memory data
//! stores.
//!
//! Two usage modes are exposed:
//!
//! - [`client::CommandClient`] issues commands and pipelines and returns
//!   typed replies to callers.
//! - [`pubsub::SubscriptionClient`] receives server-pushed pub/sub
//!   messages and forwards them to a consumer with backpressure.
//!
//! Command *encoding* for specific verbs, connection pooling and
//! application-level configuration file formats are out of scope; see
//! `SPEC_FULL.md` for the full boundary.

pub mod cfg;
pub mod client;
pub mod connection;
pub mod error;
pub mod logging;
pub mod pubsub;
pub mod resp;
pub mod sentinel;
pub mod transport;

pub use cfg::config::Config;
pub use client::CommandClient;
pub use error::Error;
pub use pubsub::SubscriptionClient;
pub use resp::value::Reply;
