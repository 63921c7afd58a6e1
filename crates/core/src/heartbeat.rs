// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background lease renewal
//!
//! One task per held lock, running on its own duplicated client. The
//! task renews every half TTL and talks to its owner over two signals
//! only: "stop" (owner to task) and "fatal error" (task to owner).
//!
//! A fatal error is a handoff, not a message: the owner must claim it
//! within one tick or the process aborts.

use crate::backend::{Client, Lock};
use crate::error::LockError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Heartbeat tuning
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Polling granularity; never longer than half the TTL
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(10),
        }
    }
}

impl HeartbeatConfig {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }
}

/// TTL and payload a renewal writes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseTerms {
    pub ttl: Duration,
    pub data: String,
}

/// A renewal failure waiting for its owner. The heartbeat aborts the
/// process unless [`claim`](Self::claim) is called within one tick.
#[derive(Debug)]
pub struct HeartbeatFailure {
    error: LockError,
    ack: oneshot::Sender<()>,
}

impl HeartbeatFailure {
    pub(crate) fn new(error: LockError) -> (Self, oneshot::Receiver<()>) {
        let (ack, claimed) = oneshot::channel();
        (Self { error, ack }, claimed)
    }

    pub fn error(&self) -> &LockError {
        &self.error
    }

    /// Take responsibility for the lost lease
    pub fn claim(self) -> LockError {
        let _ = self.ack.send(());
        self.error
    }
}

/// Owner-side handle on a running heartbeat task
#[derive(Debug)]
pub(crate) struct Heartbeat {
    stop: mpsc::Sender<()>,
    terms: watch::Sender<LeaseTerms>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawn the renewal task. The receiver yields at most one failure,
    /// after which the task exits.
    pub(crate) fn spawn<C: Client>(
        client: C,
        name: &str,
        terms: LeaseTerms,
        config: &HeartbeatConfig,
    ) -> (Self, mpsc::Receiver<HeartbeatFailure>) {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (fail_tx, fail_rx) = mpsc::channel(1);
        let (terms_tx, terms_rx) = watch::channel(terms);

        let task = tokio::spawn(run(
            client,
            name.to_string(),
            terms_rx,
            stop_rx,
            fail_tx,
            config.tick,
        ));

        let heartbeat = Self {
            stop: stop_tx,
            terms: terms_tx,
            task,
        };
        (heartbeat, fail_rx)
    }

    /// Terms for the next renewal
    pub(crate) fn update(&self, terms: LeaseTerms) {
        self.terms.send_replace(terms);
    }

    /// Stop the task and wait for it to exit. No renewal runs after this returns.
    pub(crate) async fn stop(self) {
        // A task that already escalated a failure has dropped its receiver
        let _ = self.stop.send(()).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "heartbeat task ended abnormally");
        }
    }
}

async fn run<C: Client>(
    mut client: C,
    name: String,
    mut terms: watch::Receiver<LeaseTerms>,
    mut stop: mpsc::Receiver<()>,
    failures: mpsc::Sender<HeartbeatFailure>,
    tick: Duration,
) {
    if let Err(e) = client.reconnect().await {
        escalate(&failures, &mut stop, &name, e, tick).await;
        return;
    }

    let mut current = terms.borrow_and_update().clone();
    let mut lock = client.new_lock(&name);
    lock.set_data(current.data.clone());

    let mut half = current.ttl / 2;
    let mut pause = tick.min(half);
    let mut elapsed = Duration::ZERO;

    tracing::debug!(
        lock = %name,
        ttl_ms = current.ttl.as_millis() as u64,
        "heartbeat started"
    );

    loop {
        tokio::select! {
            biased;
            // A dropped sender means the owner is gone
            _ = stop.recv() => break,
            _ = tokio::time::sleep(pause) => {}
        }

        if terms.has_changed().unwrap_or(false) {
            current = terms.borrow_and_update().clone();
            lock.set_data(current.data.clone());
            half = current.ttl / 2;
        }

        elapsed += pause;
        pause = tick.min(half);
        if elapsed < half {
            continue;
        }

        let started = Instant::now();
        if let Err(e) = lock.refresh_ttl(current.ttl).await {
            escalate(&failures, &mut stop, &name, e, tick).await;
            break;
        }
        let took = started.elapsed();
        tracing::trace!(lock = %name, took_ms = took.as_millis() as u64, "lease renewed");

        // Keep the cadence anchored to when the renewal started
        elapsed = took;
        pause = pause.saturating_sub(took);
    }

    client.close().await;
    tracing::debug!(lock = %name, "heartbeat stopped");
}

/// Hand a renewal failure to the owner, or abort the process if nobody
/// claims it within one tick: a lease that cannot be proven alive must
/// not be held. A stop request during the handoff also counts as the
/// owner taking over.
async fn escalate(
    failures: &mpsc::Sender<HeartbeatFailure>,
    stop: &mut mpsc::Receiver<()>,
    name: &str,
    error: LockError,
    tick: Duration,
) {
    tracing::error!(lock = %name, error = %error, "cannot refresh lock");

    let (failure, claimed) = HeartbeatFailure::new(error);
    let handoff = async move { failures.send(failure).await.is_ok() && claimed.await.is_ok() };

    tokio::select! {
        biased;
        Some(()) = stop.recv() => {
            tracing::debug!(lock = %name, "heartbeat stopped before its failure was claimed");
        }
        outcome = tokio::time::timeout(tick, handoff) => {
            if !matches!(outcome, Ok(true)) {
                tracing::error!(lock = %name, "heartbeat failure unclaimed, aborting");
                std::process::abort();
            }
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
