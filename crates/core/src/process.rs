// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Child process capability consumed by the supervisor

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

/// A running child the supervisor can observe, signal and kill
#[async_trait]
pub trait ChildProcess: Send {
    /// OS process id, `None` once the child has been reaped
    fn id(&self) -> Option<u32>;

    /// Wait for the child to exit. Cancel-safe, and repeatable after exit.
    async fn wait(&mut self) -> io::Result<ExitStatus>;

    /// Deliver `signal` to the child
    fn signal(&self, signal: Signal) -> io::Result<()>;

    /// Unconditional kill; does not wait
    fn kill(&mut self) -> io::Result<()>;

    /// Ask the child to terminate, killing it if it is still running after `grace`
    async fn terminate(&mut self, grace: Duration) -> io::Result<ExitStatus> {
        if let Err(e) = self.signal(Signal::SIGTERM) {
            tracing::debug!(error = %e, "cannot deliver SIGTERM, killing");
            self.kill()?;
        }
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(status) => status,
            Err(_) => {
                tracing::warn!(
                    pid = ?self.id(),
                    grace_ms = grace.as_millis() as u64,
                    "child ignored SIGTERM, killing"
                );
                self.kill()?;
                self.wait().await
            }
        }
    }
}

#[async_trait]
impl ChildProcess for tokio::process::Child {
    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        tokio::process::Child::wait(self).await
    }

    fn signal(&self, signal: Signal) -> io::Result<()> {
        let Some(pid) = ChildProcess::id(self) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "child exited"));
        };
        kill(Pid::from_raw(pid as i32), signal)?;
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.start_kill()
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
