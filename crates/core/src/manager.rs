// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock manager
//!
//! Tracks the locks held by one client, retries contended acquisitions
//! until a deadline, and owns the heartbeat task of every lock it keeps
//! alive. Bookkeeping is mutated only through `&mut self`, so callers
//! sharing a manager serialise access themselves.

use crate::backend::{Client, Lock};
use crate::error::LockError;
use crate::heartbeat::{Heartbeat, HeartbeatConfig, HeartbeatFailure, LeaseTerms};
use crate::lease::LockInfo;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Floor between polls when the holder vanished between attempt and inspection
const MIN_POLL: Duration = Duration::from_millis(10);

/// Per-call acquisition settings; zero/empty fields fall back to the manager defaults
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireOptions {
    #[serde(default, with = "humantime_serde")]
    pub ttl: Duration,
    /// Upper bound on the total time spent waiting for a contended lock
    #[serde(default, with = "humantime_serde")]
    pub max_wait: Duration,
    #[serde(default)]
    pub data: String,
}

impl AcquireOptions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = data.into();
        self
    }

    /// Fill unset fields from `defaults`
    pub fn or(&self, defaults: &AcquireOptions) -> AcquireOptions {
        AcquireOptions {
            ttl: if self.ttl.is_zero() {
                defaults.ttl
            } else {
                self.ttl
            },
            max_wait: if self.max_wait.is_zero() {
                defaults.max_wait
            } else {
                self.max_wait
            },
            data: if self.data.is_empty() {
                defaults.data.clone()
            } else {
                self.data.clone()
            },
        }
    }
}

/// Manages all the locks held through a single client
pub struct LockManager<C: Client> {
    client: C,
    defaults: AcquireOptions,
    heartbeat: HeartbeatConfig,
    locks: HashMap<String, C::Lock>,
    /// Invariant: every key is also in `locks`
    heartbeats: HashMap<String, Heartbeat>,
}

impl<C: Client> LockManager<C> {
    pub fn new(client: C, defaults: AcquireOptions) -> Self {
        Self {
            client,
            defaults,
            heartbeat: HeartbeatConfig::default(),
            locks: HashMap::new(),
            heartbeats: HashMap::new(),
        }
    }

    pub fn with_heartbeat(mut self, config: HeartbeatConfig) -> Self {
        self.heartbeat = config;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn defaults(&self) -> &AcquireOptions {
        &self.defaults
    }

    /// Check if this manager currently tracks `name` as held
    pub fn is_held(&self, name: &str) -> bool {
        self.locks.contains_key(name)
    }

    /// Names of held locks, sorted
    pub fn held(&self) -> Vec<String> {
        let mut names: Vec<_> = self.locks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Single acquisition attempt with the default TTL
    pub async fn try_acquire(&mut self, name: &str) -> Result<(), LockError> {
        let ttl = self.defaults.ttl;
        self.try_acquire_ttl(name, ttl).await
    }

    /// Single acquisition attempt; contention surfaces as `LockHeld`
    pub async fn try_acquire_ttl(&mut self, name: &str, ttl: Duration) -> Result<(), LockError> {
        let data = self.defaults.data.clone();
        self.attempt(name, ttl, data).await
    }

    async fn attempt(&mut self, name: &str, ttl: Duration, data: String) -> Result<(), LockError> {
        let mut lock = self.client.new_lock(name);
        lock.set_data(data);
        lock.acquire(ttl).await?;

        tracing::debug!(
            lock = name,
            client = self.client.id(),
            ttl_ms = ttl.as_millis() as u64,
            "lock acquired"
        );
        self.locks.insert(name.to_string(), lock);
        Ok(())
    }

    /// Acquire `name`, waiting up to `max_wait` for the current holder to
    /// let go. Re-acquiring a lock this manager holds refreshes it with
    /// the new TTL and payload.
    pub async fn acquire(&mut self, name: &str, options: AcquireOptions) -> Result<(), LockError> {
        let options = options.or(&self.defaults);

        if self.locks.contains_key(name) {
            match self.renew(name, options.ttl, options.data.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_ownership() => {
                    tracing::warn!(
                        lock = name,
                        client = self.client.id(),
                        error = %e,
                        "held lock was lost, acquiring again"
                    );
                    self.forget(name).await;
                }
                Err(e) => return Err(e),
            }
        }

        let mut waited = Duration::ZERO;
        loop {
            match self.attempt(name, options.ttl, options.data.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_contention() => {}
                Err(e) => return Err(e),
            }

            let budget = options.max_wait.saturating_sub(waited);
            if budget.is_zero() {
                return Err(LockError::held(name));
            }

            // Sleep out the holder's remaining lease rather than busy-polling
            let info = self.client.new_lock(name).info().await?;
            let pause = info.ttl.max(MIN_POLL).min(budget);
            tracing::debug!(
                lock = name,
                owner = %info.owner,
                wait_ms = pause.as_millis() as u64,
                "lock held, waiting"
            );
            tokio::time::sleep(pause).await;
            waited += pause;
        }
    }

    async fn renew(&mut self, name: &str, ttl: Duration, data: String) -> Result<(), LockError> {
        let lock = self
            .locks
            .get_mut(name)
            .ok_or_else(|| LockError::InvalidLock(name.to_string()))?;
        lock.set_data(data);
        lock.refresh_ttl(ttl).await?;
        self.sync_heartbeat(name);
        Ok(())
    }

    /// Refresh a held lock with its stored TTL, committing any pending payload
    pub async fn refresh(&mut self, name: &str) -> Result<(), LockError> {
        let lock = self
            .locks
            .get_mut(name)
            .ok_or_else(|| LockError::InvalidLock(name.to_string()))?;
        lock.refresh().await?;
        self.sync_heartbeat(name);
        Ok(())
    }

    /// Set the pending payload of a held lock; it reaches the store on the next refresh
    pub fn set_data(&mut self, name: &str, data: impl Into<String>) -> Result<(), LockError> {
        let lock = self
            .locks
            .get_mut(name)
            .ok_or_else(|| LockError::InvalidLock(name.to_string()))?;
        lock.set_data(data.into());
        self.sync_heartbeat(name);
        Ok(())
    }

    pub async fn info(&self, name: &str) -> Result<LockInfo, LockError> {
        let lock = self
            .locks
            .get(name)
            .ok_or_else(|| LockError::InvalidLock(name.to_string()))?;
        lock.info().await
    }

    /// Release a held lock. The heartbeat is stopped first and local
    /// bookkeeping is dropped whatever the backend answers.
    pub async fn release(&mut self, name: &str) -> Result<(), LockError> {
        self.stop_heartbeat(name).await;
        let mut lock = self
            .locks
            .remove(name)
            .ok_or_else(|| LockError::InvalidLock(name.to_string()))?;

        let result = lock.release().await;
        match &result {
            Ok(()) => tracing::debug!(lock = name, client = self.client.id(), "lock released"),
            Err(e) => {
                tracing::warn!(
                    lock = name,
                    client = self.client.id(),
                    error = %e,
                    "release failed"
                );
            }
        }
        result
    }

    /// Release every held lock, reporting failures per name
    pub async fn release_all(&mut self) -> HashMap<String, LockError> {
        let mut failures = HashMap::new();
        for name in self.held() {
            if let Err(e) = self.release(&name).await {
                failures.insert(name, e);
            }
        }
        failures
    }

    /// Keep a held lock alive in the background. The receiver yields the
    /// renewal failure if the lease can no longer be refreshed; the caller
    /// must keep reading it and claim the failure within one tick, or the
    /// process aborts.
    pub async fn start_heartbeat(
        &mut self,
        name: &str,
    ) -> Result<mpsc::Receiver<HeartbeatFailure>, LockError> {
        let terms = self.terms(name)?;
        self.stop_heartbeat(name).await;

        let (heartbeat, failures) =
            Heartbeat::spawn(self.client.duplicate(), name, terms, &self.heartbeat);
        self.heartbeats.insert(name.to_string(), heartbeat);
        Ok(failures)
    }

    /// Stop the heartbeat for `name`, if any, and wait for it to exit
    pub async fn stop_heartbeat(&mut self, name: &str) {
        if let Some(heartbeat) = self.heartbeats.remove(name) {
            heartbeat.stop().await;
        }
    }

    fn terms(&self, name: &str) -> Result<LeaseTerms, LockError> {
        let lock = self
            .locks
            .get(name)
            .ok_or_else(|| LockError::InvalidLock(name.to_string()))?;
        Ok(LeaseTerms {
            ttl: lock.ttl(),
            data: lock.data().to_string(),
        })
    }

    fn sync_heartbeat(&self, name: &str) {
        if let (Some(heartbeat), Ok(terms)) = (self.heartbeats.get(name), self.terms(name)) {
            heartbeat.update(terms);
        }
    }

    /// Drop bookkeeping for a lease that is already gone server-side
    async fn forget(&mut self, name: &str) {
        self.stop_heartbeat(name).await;
        self.locks.remove(name);
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
