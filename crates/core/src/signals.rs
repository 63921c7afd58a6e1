// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Signal relay for the supervisor
//!
//! Every relayed signal gets its own listener task feeding one channel,
//! so the supervisor sees a single ordered stream. `SIGCHLD` is never
//! relayed: child exit is observed through the child handle.

use nix::sys::signal::Signal;
use std::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Signals that are never intercepted. The first five cannot be caught
/// or are refused by `tokio::signal`; the next three are raised by faults
/// or `abort` in the supervisor itself.
const NOT_RELAYED: &[Signal] = &[
    Signal::SIGKILL,
    Signal::SIGSTOP,
    Signal::SIGILL,
    Signal::SIGFPE,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGTRAP,
    Signal::SIGABRT,
    Signal::SIGCHLD,
];

/// Every signal the supervisor intercepts
pub fn relayed() -> impl Iterator<Item = Signal> {
    Signal::iterator().filter(|sig| !NOT_RELAYED.contains(sig))
}

/// What the supervisor does with an incoming signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Kill the child and keep waiting for its exit
    Kill,
    /// Pass the signal to the child unchanged
    Forward,
    Ignore,
}

pub fn classify(signal: Signal) -> Disposition {
    match signal {
        Signal::SIGINT | Signal::SIGTERM => Disposition::Kill,
        Signal::SIGCHLD => Disposition::Ignore,
        _ => Disposition::Forward,
    }
}

/// Stream of intercepted signals; listeners stop when dropped
#[derive(Debug)]
pub struct SignalRelay {
    rx: mpsc::Receiver<Signal>,
    listeners: Vec<JoinHandle<()>>,
}

impl SignalRelay {
    /// Start intercepting every signal yielded by [`relayed`].
    ///
    /// Dropping the relay stops the listeners, but the handlers stay
    /// registered with the OS for the rest of the process: from then on
    /// those signals no longer take their default action.
    pub fn install() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel(16);
        let mut listeners = Vec::new();

        for sig in relayed() {
            let mut stream = signal(SignalKind::from_raw(sig as i32))?;
            let tx = tx.clone();
            listeners.push(tokio::spawn(async move {
                while stream.recv().await.is_some() {
                    if tx.send(sig).await.is_err() {
                        break;
                    }
                }
            }));
        }

        Ok(Self { rx, listeners })
    }

    /// Relay fed by hand instead of by the OS
    pub fn manual() -> (mpsc::Sender<Signal>, Self) {
        let (tx, rx) = mpsc::channel(16);
        (
            tx,
            Self {
                rx,
                listeners: Vec::new(),
            },
        )
    }

    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }
}

impl Drop for SignalRelay {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.abort();
        }
    }
}

#[cfg(test)]
#[path = "signals_tests.rs"]
mod tests;
