// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend capability traits
//!
//! A backend is selected at construction time by picking a `Client`
//! implementation. Every implementation provides the full contract,
//! including `duplicate` so background tasks get their own connection.

use crate::error::LockError;
use crate::lease::LockInfo;
use async_trait::async_trait;
use std::time::Duration;

/// Connection to a lease store under one client identity
#[async_trait]
pub trait Client: Send + Sync + 'static {
    type Lock: Lock;

    /// Identity that owns leases acquired through this client
    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    /// Replace the underlying connection, connecting if needed. Idempotent.
    async fn reconnect(&mut self) -> Result<(), LockError>;

    /// Drop the underlying connection. Idempotent.
    async fn close(&mut self);

    /// New, unconnected client with the same settings and identity
    fn duplicate(&self) -> Self
    where
        Self: Sized;

    /// Mint a handle for `name`; the lease is not acquired
    fn new_lock(&self, name: &str) -> Self::Lock;
}

/// Handle on one named lease for one client identity
///
/// The pending payload set through `set_data` reaches the store only on
/// the next successful `acquire` or `refresh`.
#[async_trait]
pub trait Lock: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Identity captured when the handle was minted
    fn owner(&self) -> &str;

    /// TTL used by the next `refresh`
    fn ttl(&self) -> Duration;

    /// Pending payload
    fn data(&self) -> &str;

    fn set_data(&mut self, data: String);

    /// Create the lease iff none is live. Never succeeds twice in a row.
    async fn acquire(&mut self, ttl: Duration) -> Result<(), LockError>;

    /// Extend the lease by the stored TTL and commit the pending payload
    async fn refresh(&mut self) -> Result<(), LockError>;

    /// Like `refresh`, but `ttl` becomes the stored TTL first
    async fn refresh_ttl(&mut self, ttl: Duration) -> Result<(), LockError>;

    /// Delete the lease iff owned
    async fn release(&mut self) -> Result<(), LockError>;

    /// Current state of the lease; a missing lease is not an error
    async fn info(&self) -> Result<LockInfo, LockError>;
}
