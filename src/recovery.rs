//! # Recovery Controller
//!
//! A supervisory loop polling both the printer session and the MQTT
//! connection. Whichever is down gets a reconnect attempt; a shared
//! counter tracks consecutive failures across both resources and trips a
//! fatal shutdown signal at the configured threshold — the only fatal
//! condition in the whole bridge.
//!
//! The controller communicates shutdown through a watch channel rather
//! than touching process state itself; the main task owns the decision to
//! exit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use crate::mqtt::{ConnectionManager, ConnectionState};
use crate::printer::PrinterSession;

/// Default poll interval between liveness checks.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Tracks consecutive failed reconnect attempts across both resources.
///
/// Any success resets the counter; the controller stops the bridge once
/// `max` consecutive failures accumulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureTracker {
    attempts: u32,
    max: u32,
}

impl FailureTracker {
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    /// Record a reconnect outcome.
    pub fn record(&mut self, success: bool) {
        if success {
            self.attempts = 0;
        } else {
            self.attempts += 1;
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether the failure threshold has been reached.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max
    }
}

/// Supervises the printer session and the MQTT connection.
pub struct RecoveryController {
    printer: Arc<Mutex<PrinterSession>>,
    connection: Arc<ConnectionManager>,
    tracker: FailureTracker,
    poll_interval: Duration,
    fatal_tx: watch::Sender<bool>,
}

impl RecoveryController {
    /// Build a controller and the receiver half of its fatal-shutdown
    /// signal.
    pub fn new(
        printer: Arc<Mutex<PrinterSession>>,
        connection: Arc<ConnectionManager>,
        max_attempts: u32,
    ) -> (Self, watch::Receiver<bool>) {
        let (fatal_tx, fatal_rx) = watch::channel(false);
        (
            Self {
                printer,
                connection,
                tracker: FailureTracker::new(max_attempts),
                poll_interval: POLL_INTERVAL,
                fatal_tx,
            },
            fatal_rx,
        )
    }

    /// Run the poll loop until the failure threshold trips.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "recovery controller started"
        );

        loop {
            ticker.tick().await;
            self.tick().await;

            if self.tracker.exhausted() {
                error!(
                    attempts = self.tracker.attempts(),
                    "recovery attempt limit reached, signaling fatal shutdown"
                );
                let _ = self.fatal_tx.send(true);
                return;
            }
        }
    }

    /// One supervision pass: reconnect whichever resource is down.
    async fn tick(&mut self) {
        {
            let mut printer = self.printer.lock().await;
            if !printer.is_connected() {
                warn!("printer offline, attempting recovery");
                match printer.reconnect() {
                    Ok(()) => {
                        info!("printer reconnected");
                        self.tracker.record(true);
                    }
                    Err(e) => {
                        self.tracker.record(false);
                        error!(
                            error = %e,
                            attempt = self.tracker.attempts(),
                            "printer recovery failed"
                        );
                    }
                }
            }
        }

        if self.connection.state() != ConnectionState::Connected {
            warn!("MQTT disconnected, attempting recovery");
            match self.connection.reconnect().await {
                Ok(()) => {
                    info!("MQTT reconnected");
                    self.tracker.record(true);
                }
                Err(e) => {
                    self.tracker.record(false);
                    error!(
                        error = %e,
                        attempt = self.tracker.attempts(),
                        "MQTT recovery failed"
                    );
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
