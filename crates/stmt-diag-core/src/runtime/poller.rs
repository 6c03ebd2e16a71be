// crates/stmt-diag-core/src/runtime/poller.rs
// ============================================================================
// Module: Statement Diagnostics Poller
// Description: Background thread running periodic request reconciliation.
// Purpose: Catch requests whose broadcast was lost or never delivered.
// Dependencies: crate::runtime::registry, crate::runtime::events
// ============================================================================

//! ## Overview
//! The poller calls [`DiagnosticsRegistry::poll_requests`] on a fixed interval
//! from a dedicated named thread. Poll failures are logged and retried on the
//! next tick. Stopping is cooperative through a channel, so a stop request
//! interrupts the wait between polls but never a poll in progress.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::runtime::events::DiagnosticsEvent;
use crate::runtime::events::EventKind;
use crate::runtime::registry::DiagnosticsRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default interval between reconciliations.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Name given to the poller thread.
const POLLER_THREAD_NAME: &str = "stmt-diag-poller";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Poller settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Wait between polls.
    pub interval: Duration,
    /// Stop after this many polls; `None` runs until stopped.
    pub max_rounds: Option<u64>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_rounds: None,
        }
    }
}

/// Handle to a running poller thread.
pub struct PollerHandle {
    /// Stop signal; dropping the sender also stops the loop.
    stop_tx: mpsc::Sender<()>,
    /// Poller thread.
    join: JoinHandle<u64>,
}

impl PollerHandle {
    /// Signals the poller to stop and waits for it. Returns the number of
    /// polls performed.
    ///
    /// # Errors
    ///
    /// Returns an error when the poller thread panicked.
    pub fn stop(self) -> Result<u64, io::Error> {
        let _ = self.stop_tx.send(());
        self.join()
    }

    /// Waits for the poller to exit on its own (bounded `max_rounds`).
    ///
    /// # Errors
    ///
    /// Returns an error when the poller thread panicked.
    pub fn join(self) -> Result<u64, io::Error> {
        self.join.join().map_err(|_| io::Error::other("diagnostics poller thread panicked"))
    }
}

// ============================================================================
// SECTION: Spawn
// ============================================================================

/// Spawns the reconciliation thread for `registry`.
///
/// The first poll runs immediately so a freshly started process picks up
/// requests inserted before it started.
///
/// # Errors
///
/// Returns an error when the thread cannot be spawned.
pub fn spawn_poller(
    registry: DiagnosticsRegistry,
    config: PollerConfig,
) -> Result<PollerHandle, io::Error> {
    let (stop_tx, stop_rx) = mpsc::channel();
    let join = thread::Builder::new()
        .name(POLLER_THREAD_NAME.to_string())
        .spawn(move || poller_loop(&registry, config, &stop_rx))?;
    Ok(PollerHandle {
        stop_tx,
        join,
    })
}

/// Poll loop body; returns the number of polls performed.
fn poller_loop(
    registry: &DiagnosticsRegistry,
    config: PollerConfig,
    stop_rx: &mpsc::Receiver<()>,
) -> u64 {
    let mut rounds = 0_u64;
    loop {
        if let Err(err) = registry.poll_requests() {
            registry.record_event(&DiagnosticsEvent::new(
                EventKind::PollFailed,
                format!("failed to poll for diagnostics requests: {err}"),
            ));
        }
        rounds += 1;
        if config.max_rounds.is_some_and(|max| rounds >= max) {
            return rounds;
        }
        match stop_rx.recv_timeout(config.interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return rounds,
        }
    }
}
