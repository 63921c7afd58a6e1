// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory lease backend
//!
//! The lease table is the source of truth, so a single mutex guarding
//! the whole table is all the synchronisation it needs. Expiry is
//! evaluated against the store's clock on every access.

use crate::backend::{Client, Lock};
use crate::clock::{Clock, SystemClock};
use crate::error::{validate_ttl, LockError};
use crate::id::client_id;
use crate::lease::{Lease, LeaseInput, LeaseState, LockInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Smallest TTL the memory backend accepts
pub const MIN_TTL: Duration = Duration::from_millis(1);

static GLOBAL: OnceLock<MemoryStore> = OnceLock::new();

#[derive(Debug, Default)]
struct Table {
    leases: HashMap<String, Lease>,
    unavailable: bool,
}

/// Shared handle on a lease table
#[derive(Clone, Debug)]
pub struct MemoryStore<C: Clock = SystemClock> {
    table: Arc<Mutex<Table>>,
    clock: C,
}

impl MemoryStore<SystemClock> {
    /// Isolated table on the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Process-wide table, created on first use
    pub fn global() -> Self {
        GLOBAL.get_or_init(MemoryStore::new).clone()
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            table: Arc::new(Mutex::new(Table::default())),
            clock,
        }
    }

    /// Drop a lease as if it had expired. Returns whether one was live.
    pub fn evict(&self, name: &str) -> bool {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table
            .leases
            .remove(name)
            .is_some_and(|lease| !lease.is_free(&self.clock))
    }

    /// Make every operation fail with a backend error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.unavailable = unavailable;
    }

    /// Names with a live lease, sorted
    pub fn live(&self) -> Vec<String> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<_> = table
            .leases
            .values()
            .filter(|lease| !lease.is_free(&self.clock))
            .map(|lease| lease.name.clone())
            .collect();
        names.sort();
        names
    }

    fn apply(&self, name: &str, input: LeaseInput) -> Result<(), LockError> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.unavailable {
            return Err(unavailable());
        }

        let lease = table
            .leases
            .get(name)
            .cloned()
            .unwrap_or_else(|| Lease::new(name));
        let next = lease.transition(input, &self.clock)?;

        if next.state == LeaseState::Free {
            table.leases.remove(name);
        } else {
            table.leases.insert(name.to_string(), next);
        }
        Ok(())
    }

    fn info(&self, name: &str) -> Result<LockInfo, LockError> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table.unavailable {
            return Err(unavailable());
        }
        Ok(table
            .leases
            .get(name)
            .map(|lease| lease.info(&self.clock))
            .unwrap_or_else(|| LockInfo::free(name)))
    }
}

fn unavailable() -> LockError {
    let reason = std::io::Error::new(std::io::ErrorKind::NotConnected, "store unavailable");
    LockError::backend(reason)
}

/// Client over a `MemoryStore`
#[derive(Clone, Debug)]
pub struct MemoryClient<C: Clock = SystemClock> {
    id: String,
    store: MemoryStore<C>,
}

impl MemoryClient<SystemClock> {
    /// Client on the process-wide table with a fresh identity
    pub fn new() -> Self {
        Self::with_store(MemoryStore::global())
    }
}

impl Default for MemoryClient<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryClient<C> {
    /// Client on a specific table with a fresh identity
    pub fn with_store(store: MemoryStore<C>) -> Self {
        Self {
            id: client_id(),
            store,
        }
    }

    pub fn store(&self) -> &MemoryStore<C> {
        &self.store
    }
}

#[async_trait]
impl<C: Clock> Client for MemoryClient<C> {
    type Lock = MemoryLock<C>;

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    async fn reconnect(&mut self) -> Result<(), LockError> {
        Ok(())
    }

    async fn close(&mut self) {}

    fn duplicate(&self) -> Self {
        self.clone()
    }

    fn new_lock(&self, name: &str) -> MemoryLock<C> {
        MemoryLock {
            name: name.to_string(),
            owner: self.id.clone(),
            ttl: Duration::ZERO,
            data: String::new(),
            store: self.store.clone(),
        }
    }
}

/// Lease handle minted by a `MemoryClient`
#[derive(Debug)]
pub struct MemoryLock<C: Clock = SystemClock> {
    name: String,
    owner: String,
    ttl: Duration,
    data: String,
    store: MemoryStore<C>,
}

#[async_trait]
impl<C: Clock> Lock for MemoryLock<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }

    fn data(&self) -> &str {
        &self.data
    }

    fn set_data(&mut self, data: String) {
        self.data = data;
    }

    async fn acquire(&mut self, ttl: Duration) -> Result<(), LockError> {
        validate_ttl(ttl, MIN_TTL)?;
        self.ttl = ttl;
        self.store.apply(
            &self.name,
            LeaseInput::Acquire {
                owner: self.owner.clone(),
                ttl,
                data: self.data.clone(),
            },
        )
    }

    async fn refresh(&mut self) -> Result<(), LockError> {
        validate_ttl(self.ttl, MIN_TTL)?;
        self.store.apply(
            &self.name,
            LeaseInput::Refresh {
                owner: self.owner.clone(),
                ttl: self.ttl,
                data: self.data.clone(),
            },
        )
    }

    async fn refresh_ttl(&mut self, ttl: Duration) -> Result<(), LockError> {
        validate_ttl(ttl, MIN_TTL)?;
        self.ttl = ttl;
        self.refresh().await
    }

    async fn release(&mut self) -> Result<(), LockError> {
        self.store.apply(
            &self.name,
            LeaseInput::Release {
                owner: self.owner.clone(),
            },
        )
    }

    async fn info(&self) -> Result<LockInfo, LockError> {
        self.store.info(&self.name)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
