// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared by every backend and by the lock manager

use std::time::Duration;
use thiserror::Error;

/// Boxed transport error raised by a backend driver
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by lease operations
#[derive(Debug, Error)]
pub enum LockError {
    /// TTL below the backend's floor; raised before any backend call
    #[error("invalid ttl value: {0:?}")]
    InvalidTtl(Duration),
    /// A live lease for the name exists under a different owner
    #[error("lock '{name}' held by other client")]
    LockHeld { name: String },
    /// The lease does not exist or belongs to someone else
    #[error("lock '{name}' not owned by this client")]
    NotOwned { name: String },
    /// The manager does not hold a lock with this name
    #[error("invalid lock name: {0}")]
    InvalidLock(String),
    /// The client has no open connection to its backend
    #[error("client is not connected")]
    Disconnected,
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
}

impl LockError {
    pub fn held(name: impl Into<String>) -> Self {
        Self::LockHeld { name: name.into() }
    }

    pub fn not_owned(name: impl Into<String>) -> Self {
        Self::NotOwned { name: name.into() }
    }

    /// Wrap a driver error without reinterpreting it
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BackendError>,
    {
        Self::Backend(err.into())
    }

    /// Contention is the only recoverable outcome: it drives wait-and-retry
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::LockHeld { .. })
    }

    /// Ownership failures are terminal and must not be retried
    pub fn is_ownership(&self) -> bool {
        matches!(self, Self::NotOwned { .. } | Self::InvalidLock(_))
    }
}

/// Errors raised while running a command under a lock
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("cannot acquire lock: {0}")]
    Acquire(#[source] LockError),
    #[error("command vetoed: {0}")]
    Vetoed(String),
    #[error("cannot start command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("cannot start heartbeat: {0}")]
    HeartbeatStart(#[source] LockError),
    /// The lease could not be renewed; the command was killed
    #[error("lock lost while command was running: {0}")]
    LeaseLost(#[source] LockError),
    #[error("cannot wait for command: {0}")]
    Wait(#[source] std::io::Error),
    /// Killed by a signal the supervisor did not send
    #[error("command killed by signal {0}")]
    Signaled(i32),
    #[error("cannot install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

impl ExecError {
    /// Process exit code for a supervisor-side failure
    pub fn exit_code(&self) -> i32 {
        -1
    }
}

/// Reject TTLs below `floor` (zero is always rejected)
pub fn validate_ttl(ttl: Duration, floor: Duration) -> Result<(), LockError> {
    if ttl.is_zero() || ttl < floor {
        return Err(LockError::InvalidTtl(ttl));
    }
    Ok(())
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
