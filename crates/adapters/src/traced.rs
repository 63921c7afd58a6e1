// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced backend wrappers for consistent observability

use async_trait::async_trait;
use leash_core::{Client, Lock, LockError, LockInfo};
use std::time::{Duration, Instant};

/// Wrapper that adds tracing to any `Client`
#[derive(Clone, Debug)]
pub struct TracedClient<C> {
    inner: C,
}

impl<C> TracedClient<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Client> Client for TracedClient<C> {
    type Lock = TracedLock<C::Lock>;

    fn id(&self) -> &str {
        self.inner.id()
    }

    fn set_id(&mut self, id: String) {
        tracing::debug!(from = self.inner.id(), to = %id, "client id changed");
        self.inner.set_id(id);
    }

    async fn reconnect(&mut self) -> Result<(), LockError> {
        let span = tracing::info_span!("client.reconnect", client = self.inner.id());
        let _guard = span.enter();

        let start = Instant::now();
        let result = self.inner.reconnect().await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, "connected"),
            Err(e) => tracing::error!(
                elapsed_ms = elapsed.as_millis() as u64,
                error = %e,
                "connect failed"
            ),
        }

        result
    }

    async fn close(&mut self) {
        self.inner.close().await;
        tracing::trace!(client = self.inner.id(), "closed");
    }

    fn duplicate(&self) -> Self {
        Self::new(self.inner.duplicate())
    }

    fn new_lock(&self, name: &str) -> TracedLock<C::Lock> {
        TracedLock::new(self.inner.new_lock(name))
    }
}

/// Wrapper that adds tracing to any `Lock`
#[derive(Debug)]
pub struct TracedLock<L> {
    inner: L,
}

impl<L> TracedLock<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

fn ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

#[async_trait]
impl<L: Lock> Lock for TracedLock<L> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn owner(&self) -> &str {
        self.inner.owner()
    }

    fn ttl(&self) -> Duration {
        self.inner.ttl()
    }

    fn data(&self) -> &str {
        self.inner.data()
    }

    fn set_data(&mut self, data: String) {
        self.inner.set_data(data);
    }

    async fn acquire(&mut self, ttl: Duration) -> Result<(), LockError> {
        let span = tracing::info_span!(
            "lock.acquire",
            lock = self.inner.name(),
            client = self.inner.owner()
        );
        let _guard = span.enter();

        let start = Instant::now();
        let result = self.inner.acquire(ttl).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(()) => tracing::info!(ttl_ms = ms(ttl), elapsed_ms = ms(elapsed), "acquired"),
            // Contention is routine for waiting callers
            Err(e) if e.is_contention() => {
                tracing::debug!(elapsed_ms = ms(elapsed), "held elsewhere")
            }
            Err(e) => tracing::error!(elapsed_ms = ms(elapsed), error = %e, "acquire failed"),
        }

        result
    }

    async fn refresh(&mut self) -> Result<(), LockError> {
        let result = self.inner.refresh().await;
        match &result {
            Ok(()) => tracing::trace!(
                lock = self.inner.name(),
                ttl_ms = ms(self.inner.ttl()),
                "refreshed"
            ),
            Err(e) => tracing::error!(lock = self.inner.name(), error = %e, "refresh failed"),
        }
        result
    }

    async fn refresh_ttl(&mut self, ttl: Duration) -> Result<(), LockError> {
        let start = Instant::now();
        let result = self.inner.refresh_ttl(ttl).await;
        match &result {
            Ok(()) => tracing::trace!(
                lock = self.inner.name(),
                ttl_ms = ms(ttl),
                elapsed_ms = ms(start.elapsed()),
                "refreshed"
            ),
            Err(e) => tracing::error!(lock = self.inner.name(), error = %e, "refresh failed"),
        }
        result
    }

    async fn release(&mut self) -> Result<(), LockError> {
        let span = tracing::info_span!(
            "lock.release",
            lock = self.inner.name(),
            client = self.inner.owner()
        );
        let _guard = span.enter();

        let start = Instant::now();
        let result = self.inner.release().await;

        // Releasing an expired lease is often acceptable
        match &result {
            Ok(()) => tracing::info!(elapsed_ms = ms(start.elapsed()), "released"),
            Err(e) => tracing::warn!(error = %e, "release failed (may be expected)"),
        }

        result
    }

    async fn info(&self) -> Result<LockInfo, LockError> {
        let result = self.inner.info().await;
        tracing::trace!(
            lock = self.inner.name(),
            acquired = ?result.as_ref().map(|info| info.acquired).ok(),
            "inspected"
        );
        result
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
