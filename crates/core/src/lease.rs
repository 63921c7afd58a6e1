// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease state machine
//!
//! The compare-and-swap rules every backend must honour, expressed as a
//! pure transition function. A lease whose TTL has run out is
//! indistinguishable from a free one.

use crate::clock::Clock;
use crate::error::LockError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Snapshot of a lease as seen by any client
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub name: String,
    /// True while a live lease exists
    pub acquired: bool,
    /// Identity of the owning client, empty when free
    pub owner: String,
    /// Remaining time until the lease expires
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub data: String,
}

impl LockInfo {
    /// Info for a name with no live lease
    pub fn free(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            acquired: false,
            owner: String::new(),
            ttl: Duration::ZERO,
            data: String::new(),
        }
    }
}

/// Lease state
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseState {
    Free,
    Held {
        owner: String,
        data: String,
        expires_at: Instant,
    },
}

/// A named lease
#[derive(Clone, Debug)]
pub struct Lease {
    pub name: String,
    pub state: LeaseState,
}

/// Operations that can change a lease
#[derive(Clone, Debug)]
pub enum LeaseInput {
    /// Create the lease iff none is live
    Acquire {
        owner: String,
        ttl: Duration,
        data: String,
    },
    /// Delete the lease iff `owner` holds it
    Release { owner: String },
    /// Rewrite TTL and payload iff `owner` holds it
    Refresh {
        owner: String,
        ttl: Duration,
        data: String,
    },
}

impl Lease {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: LeaseState::Free,
        }
    }

    /// Owner of the live lease, if any
    pub fn owner(&self, clock: &impl Clock) -> Option<&str> {
        match &self.state {
            LeaseState::Held {
                owner, expires_at, ..
            } if !clock.is_past(*expires_at) => Some(owner),
            _ => None,
        }
    }

    /// Check if no live lease exists
    pub fn is_free(&self, clock: &impl Clock) -> bool {
        self.owner(clock).is_none()
    }

    pub fn info(&self, clock: &impl Clock) -> LockInfo {
        match &self.state {
            LeaseState::Held {
                owner,
                data,
                expires_at,
            } if !clock.is_past(*expires_at) => LockInfo {
                name: self.name.clone(),
                acquired: true,
                owner: owner.clone(),
                ttl: clock.remaining(*expires_at),
                data: data.clone(),
            },
            _ => LockInfo::free(&self.name),
        }
    }

    /// Pure state transition function
    pub fn transition(&self, input: LeaseInput, clock: &impl Clock) -> Result<Lease, LockError> {
        let mut next = self.clone();

        match input {
            LeaseInput::Acquire { owner, ttl, data } => {
                if ttl.is_zero() {
                    return Err(LockError::InvalidTtl(ttl));
                }
                if !self.is_free(clock) {
                    return Err(LockError::held(&self.name));
                }
                next.state = LeaseState::Held {
                    owner,
                    data,
                    expires_at: clock.deadline(ttl),
                };
            }

            LeaseInput::Release { owner } => {
                if self.owner(clock) != Some(owner.as_str()) {
                    return Err(LockError::not_owned(&self.name));
                }
                next.state = LeaseState::Free;
            }

            LeaseInput::Refresh { owner, ttl, data } => {
                if ttl.is_zero() {
                    return Err(LockError::InvalidTtl(ttl));
                }
                if self.owner(clock) != Some(owner.as_str()) {
                    return Err(LockError::not_owned(&self.name));
                }
                next.state = LeaseState::Held {
                    owner,
                    data,
                    expires_at: clock.deadline(ttl),
                };
            }
        }

        Ok(next)
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
