// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! leash-core: lease locks and the supervisor that runs commands under them
//!
//! This crate provides:
//! - The backend capability traits (`Client`, `Lock`) and an in-memory backend
//! - A pure lease state machine
//! - The lock manager with wait-and-retry acquisition and background heartbeats
//! - The process supervisor (`LockManager::exec`) with signal forwarding

pub mod backend;
pub mod clock;
pub mod error;
pub mod exec;
pub mod heartbeat;
pub mod id;
pub mod lease;
pub mod manager;
pub mod memory;
pub mod process;
pub mod signals;

pub use backend::{Client, Lock};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{validate_ttl, BackendError, ExecError, LockError};
pub use exec::{ExecOptions, PreExec};
pub use heartbeat::{HeartbeatConfig, HeartbeatFailure, LeaseTerms};
pub use id::{client_id, IdGen, SequentialIdGen, UuidIdGen};
pub use lease::{Lease, LeaseInput, LeaseState, LockInfo};
pub use manager::{AcquireOptions, LockManager};
pub use memory::{MemoryClient, MemoryLock, MemoryStore};
pub use process::ChildProcess;
pub use signals::{Disposition, SignalRelay};
