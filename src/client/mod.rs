// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Command client (C6, spec §4.6): request queue, pipeline accounting,
//! reply dispatch, reconnect policy.

pub mod command;

pub use command::CommandClient;
