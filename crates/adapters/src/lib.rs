// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Lease backends that live outside the process, plus tracing wrappers

pub mod redis;
pub mod traced;

pub use self::redis::{RedisClient, RedisLock, RedisOptions};
pub use traced::{TracedClient, TracedLock};
