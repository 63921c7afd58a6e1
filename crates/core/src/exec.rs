// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervisor
//!
//! Runs a command while holding a lock: acquire, spawn, keep the lease
//! alive, and react to whichever comes first of child exit, an OS
//! signal, or a lost lease. The lock is released on every path.

use crate::backend::Client;
use crate::error::ExecError;
use crate::heartbeat::HeartbeatFailure;
use crate::lease::LockInfo;
use crate::manager::{AcquireOptions, LockManager};
use crate::process::ChildProcess;
use crate::signals::{classify, Disposition, SignalRelay};
use nix::sys::signal::Signal;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Hook run with the acquired lock before the command starts; `Err` vetoes the run
pub type PreExec = Box<dyn FnOnce(&LockInfo) -> Result<(), String> + Send>;

/// How a command is run under its lock
pub struct ExecOptions {
    pub acquire: AcquireOptions,
    /// Time between SIGTERM and SIGKILL when the child must go
    pub kill_grace: Duration,
    pre_exec: Option<PreExec>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            acquire: AcquireOptions::default(),
            kill_grace: Duration::from_secs(2),
            pre_exec: None,
        }
    }
}

impl std::fmt::Debug for ExecOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecOptions")
            .field("acquire", &self.acquire)
            .field("kill_grace", &self.kill_grace)
            .field("pre_exec", &self.pre_exec.is_some())
            .finish()
    }
}

impl ExecOptions {
    pub fn with_acquire(mut self, acquire: AcquireOptions) -> Self {
        self.acquire = acquire;
        self
    }

    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    pub fn with_pre_exec<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&LockInfo) -> Result<(), String> + Send + 'static,
    {
        self.pre_exec = Some(Box::new(hook));
        self
    }
}

impl<C: Client> LockManager<C> {
    /// Run `command` while holding `name`. Returns the child's exit code,
    /// or `-1` when the supervisor itself killed it.
    ///
    /// The first run installs process-wide handlers for every signal in
    /// [`relayed`](crate::signals::relayed), and they are never removed.
    /// Once `exec` has returned, signals such as SIGINT, SIGTERM and
    /// SIGTSTP no longer take their default action in this process; a
    /// caller that needs them must install its own handling.
    pub async fn exec(
        &mut self,
        name: &str,
        command: Command,
        options: ExecOptions,
    ) -> Result<i32, ExecError> {
        self.acquire(name, options.acquire.clone())
            .await
            .map_err(ExecError::Acquire)?;

        let result = self.run_locked(name, command, options).await;

        match self.release(name).await {
            Ok(()) => {}
            // Lost leases are expected after a heartbeat failure
            Err(e) if e.is_ownership() => {
                tracing::debug!(lock = name, error = %e, "lock already gone at release")
            }
            Err(e) => tracing::warn!(lock = name, error = %e, "cannot release lock"),
        }
        result
    }

    async fn run_locked(
        &mut self,
        name: &str,
        mut command: Command,
        options: ExecOptions,
    ) -> Result<i32, ExecError> {
        if let Some(hook) = options.pre_exec {
            let info = self.info(name).await.map_err(ExecError::Acquire)?;
            hook(&info).map_err(|reason| {
                tracing::info!(lock = name, %reason, "command vetoed");
                ExecError::Vetoed(reason)
            })?;
        }

        let mut relay = SignalRelay::install().map_err(ExecError::Signals)?;
        command.kill_on_drop(true);
        let mut child = command.spawn().map_err(ExecError::Spawn)?;
        tracing::info!(lock = name, pid = ?ChildProcess::id(&child), "command started");

        let mut failures = match self.start_heartbeat(name).await {
            Ok(failures) => failures,
            Err(e) => {
                if let Err(kill_err) = child.terminate(options.kill_grace).await {
                    tracing::warn!(error = %kill_err, "cannot stop command");
                }
                return Err(ExecError::HeartbeatStart(e));
            }
        };

        let result = supervise(&mut child, &mut relay, &mut failures, options.kill_grace).await;

        // A failure raised after `supervise` returned is released by the stop
        self.stop_heartbeat(name).await;
        result
    }
}

/// Event loop for a running child. Termination requests kill the child
/// and keep waiting so the exit status is never raced; a lost lease is
/// claimed, then the child is killed and the error returned at once.
pub async fn supervise<P: ChildProcess>(
    child: &mut P,
    relay: &mut SignalRelay,
    failures: &mut mpsc::Receiver<HeartbeatFailure>,
    kill_grace: Duration,
) -> Result<i32, ExecError> {
    let mut kill_requested = false;
    let mut kill_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(ExecError::Wait)?;
                tracing::info!(status = %status, "command exited");
                return exit_code(status, kill_requested);
            }

            Some(failure) = failures.recv() => {
                let err = failure.claim();
                tracing::error!(error = %err, "lock lost, killing command");
                if let Err(e) = child.terminate(kill_grace).await {
                    tracing::warn!(error = %e, "cannot stop command");
                }
                return Err(ExecError::LeaseLost(err));
            }

            Some(sig) = relay.recv() => match classify(sig) {
                Disposition::Kill => {
                    tracing::warn!(signal = %sig, "termination requested, stopping command");
                    if !kill_requested {
                        kill_requested = true;
                        kill_deadline = Some(Instant::now() + kill_grace);
                        if let Err(e) = child.signal(Signal::SIGTERM) {
                            tracing::warn!(error = %e, "cannot deliver SIGTERM");
                        }
                    }
                }
                Disposition::Forward => {
                    if sig == Signal::SIGTSTP {
                        tracing::info!("stopping command, lock heartbeats continue");
                    }
                    tracing::debug!(signal = %sig, "forwarding signal");
                    if let Err(e) = child.signal(sig) {
                        tracing::warn!(signal = %sig, error = %e, "cannot forward signal");
                    }
                }
                Disposition::Ignore => {}
            },

            _ = sleep_until(kill_deadline) => {
                kill_deadline = None;
                tracing::warn!("command outlived its grace period, killing");
                if let Err(e) = child.kill() {
                    tracing::warn!(error = %e, "cannot kill command");
                }
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Translate a child's exit status; signals count as ours only if a kill was requested
pub fn exit_code(status: ExitStatus, kill_requested: bool) -> Result<i32, ExecError> {
    if let Some(code) = status.code() {
        return Ok(code);
    }
    match status.signal() {
        Some(_) if kill_requested => Ok(-1),
        Some(sig) => Err(ExecError::Signaled(sig)),
        None => Err(ExecError::Wait(std::io::Error::other(format!(
            "unrecognised exit status: {status}"
        )))),
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;
