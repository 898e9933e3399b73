//! # MQTT Connection Manager
//!
//! Owns the MQTT session: connect/subscribe, inbound job dispatch to the
//! rendering pipeline, outbound heartbeat/status/error/recovery records,
//! and reconnection.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! ┌────────────┐  connect()   ┌────────────┐  ConnAck   ┌────────────┐
//! │Disconnected│ ───────────► │ Connecting │ ─────────► │ Connected  │
//! └────────────┘              └─────┬──────┘            └─────┬──────┘
//!       ▲                           │ timeout/refused         │ poll error,
//!       │                           ▼                         │ disconnect
//!       └───────────────────────────┴─────────────────────────┘
//! ```
//!
//! Leaving `Connected` never triggers a reconnect from inside the event
//! loop; recovery is driven externally by the
//! [`RecoveryController`](crate::recovery::RecoveryController).
//!
//! ## Schedules
//!
//! - The **event task** polls the MQTT event loop. Job messages are
//!   handled inline, so at most one document renders/prints at a time; a
//!   second inbound job waits in the broker until the first completes.
//! - The **heartbeat task** exists only while `Connected`: it fires
//!   immediately on entry, then every configured interval, and dies with
//!   the connection. A heartbeat can never be emitted while disconnected.
//!
//! ## Topics
//!
//! `{account}/pt/{printer_id}/{suffix}` with suffixes `p` (job), `a`
//! (status), `h` (heartbeat), `e` (error), `r` (recovery).

pub mod payload;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, Publish, QoS};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::document::{DocumentRenderer, JobMessage};
use crate::error::{ReciboError, Result};
use crate::printer::PrinterSession;
use crate::template;

use payload::{ErrorRecord, HeartbeatRecord, RecoveryRecord, StatusRecord};

/// Bound on a single connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between disconnect and reconnect.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Capacity of the client request channel.
const CLIENT_CHANNEL_CAPACITY: usize = 10;

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Transport connection state, owned by the connection manager and
/// published through a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

// ============================================================================
// SETTINGS & TOPICS
// ============================================================================

/// Everything the manager needs to reach the broker.
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub keepalive: Duration,
    pub client_id: String,
    pub printer_id: String,
    pub heartbeat_interval: Duration,
}

/// The five per-printer topics.
#[derive(Debug, Clone)]
pub struct Topics {
    pub job: String,
    pub status: String,
    pub heartbeat: String,
    pub error: String,
    pub recovery: String,
}

impl Topics {
    pub fn new(account: &str, printer_id: &str) -> Self {
        let base = format!("{}/pt/{}", account, printer_id);
        Self {
            job: format!("{}/p", base),
            status: format!("{}/a", base),
            heartbeat: format!("{}/h", base),
            error: format!("{}/e", base),
            recovery: format!("{}/r", base),
        }
    }
}

/// Session counters, reported in logs and recovery records.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConnStats {
    pub messages_received: u64,
    pub jobs_received: u64,
    pub jobs_completed: u64,
    pub reconnect_count: u32,
}

// ============================================================================
// CONNECTION MANAGER
// ============================================================================

/// State shared between the manager handle and its spawned tasks.
struct Shared {
    settings: MqttSettings,
    topics: Topics,
    printer: Arc<Mutex<PrinterSession>>,
    state_tx: watch::Sender<ConnectionState>,
    stats: Mutex<ConnStats>,
    started_at: Instant,
}

/// Owns the MQTT session. Cheap to share behind an `Arc`; all methods take
/// `&self`.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    client: Mutex<Option<AsyncClient>>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(settings: MqttSettings, printer: Arc<Mutex<PrinterSession>>) -> Self {
        let topics = Topics::new(&settings.username, &settings.printer_id);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            shared: Arc::new(Shared {
                settings,
                topics,
                printer,
                state_tx,
                stats: Mutex::new(ConnStats::default()),
                started_at: Instant::now(),
            }),
            client: Mutex::new(None),
            event_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn topics(&self) -> &Topics {
        &self.shared.topics
    }

    pub async fn stats(&self) -> ConnStats {
        *self.shared.stats.lock().await
    }

    /// Connect to the broker and wait (bounded) for the session to come up.
    pub async fn connect(&self) -> Result<()> {
        let settings = &self.shared.settings;
        info!(
            broker = %settings.broker,
            port = settings.port,
            client_id = %settings.client_id,
            "connecting to MQTT broker"
        );

        self.shared.state_tx.send_replace(ConnectionState::Connecting);

        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.broker.clone(),
            settings.port,
        );
        options.set_credentials(settings.username.clone(), settings.password.clone());
        options.set_keep_alive(settings.keepalive);

        let (client, eventloop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);
        *self.client.lock().await = Some(client.clone());

        let mut state_rx = self.shared.state_tx.subscribe();
        let task = tokio::spawn(run_event_loop(self.shared.clone(), client, eventloop));
        *self.event_task.lock().await = Some(task);

        let settled = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match *state_rx.borrow_and_update() {
                    ConnectionState::Connected => return true,
                    ConnectionState::Disconnected => return false,
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return false;
                }
            }
        })
        .await;

        match settled {
            Ok(true) => Ok(()),
            Ok(false) => {
                self.disconnect().await;
                Err(ReciboError::Transport(
                    "MQTT connection refused or lost during connect".to_string(),
                ))
            }
            Err(_) => {
                self.disconnect().await;
                Err(ReciboError::Transport("MQTT connection timeout".to_string()))
            }
        }
    }

    /// Tear the session down. Safe to call in any state.
    pub async fn disconnect(&self) {
        if let Some(client) = self.client.lock().await.take() {
            let _ = client.disconnect().await;
        }
        if let Some(task) = self.event_task.lock().await.take() {
            task.abort();
        }
        self.shared.state_tx.send_replace(ConnectionState::Disconnected);
        info!("MQTT disconnected");
    }

    /// Disconnect, wait briefly, connect again. Publishes a recovery
    /// record on success.
    pub async fn reconnect(&self) -> Result<()> {
        info!("attempting MQTT reconnection");
        self.disconnect().await;
        tokio::time::sleep(RECONNECT_DELAY).await;
        self.connect().await?;

        let count = {
            let mut stats = self.shared.stats.lock().await;
            stats.reconnect_count += 1;
            stats.reconnect_count
        };

        let record = RecoveryRecord::new(
            &self.shared.settings.printer_id,
            self.shared.started_at.elapsed().as_secs(),
            count,
        );
        if let Some(client) = self.client.lock().await.as_ref() {
            self.shared
                .publish_json(client, &self.shared.topics.recovery, &record)
                .await;
        }

        Ok(())
    }
}

// ============================================================================
// EVENT LOOP
// ============================================================================

async fn run_event_loop(shared: Arc<Shared>, client: AsyncClient, mut eventloop: EventLoop) {
    let mut heartbeat: Option<JoinHandle<()>> = None;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("MQTT session established");
                    shared.state_tx.send_replace(ConnectionState::Connected);

                    match client
                        .subscribe(shared.topics.job.clone(), QoS::AtMostOnce)
                        .await
                    {
                        Ok(()) => info!(topic = %shared.topics.job, "subscribed to job topic"),
                        Err(e) => error!(error = %e, "job topic subscribe failed"),
                    }

                    if let Some(task) = heartbeat.take() {
                        task.abort();
                    }
                    heartbeat = Some(tokio::spawn(run_heartbeat(shared.clone(), client.clone())));
                } else {
                    error!(code = ?ack.code, "MQTT connection refused");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                shared.handle_publish(&client, publish).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection lost");
                break;
            }
        }
    }

    if let Some(task) = heartbeat.take() {
        task.abort();
    }
    shared.state_tx.send_replace(ConnectionState::Disconnected);
}

/// Heartbeat schedule: fire immediately, then every interval, only while
/// `Connected`.
async fn run_heartbeat(shared: Arc<Shared>, client: AsyncClient) {
    let mut state_rx = shared.state_tx.subscribe();
    let mut ticker = tokio::time::interval(shared.settings.heartbeat_interval);
    info!(
        interval_secs = shared.settings.heartbeat_interval.as_secs(),
        "heartbeat scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *state_rx.borrow_and_update() != ConnectionState::Connected {
                    break;
                }
                shared.send_heartbeat(&client).await;
            }
            changed = state_rx.changed() => {
                if changed.is_err() || *state_rx.borrow_and_update() != ConnectionState::Connected {
                    break;
                }
            }
        }
    }

    debug!("heartbeat scheduler stopped");
}

// ============================================================================
// INBOUND & OUTBOUND
// ============================================================================

impl Shared {
    async fn handle_publish(&self, client: &AsyncClient, publish: Publish) {
        self.stats.lock().await.messages_received += 1;

        if publish.topic == self.topics.job {
            self.handle_job(client, &publish.payload).await;
        } else {
            warn!(topic = %publish.topic, "message on unexpected topic");
        }
    }

    /// Handle one print job, synchronously: parse, substitute template
    /// variables, render, print, report. Malformed payloads are dropped
    /// without a status record (no order id is recoverable from them).
    async fn handle_job(&self, client: &AsyncClient, raw: &[u8]) {
        debug!(bytes = raw.len(), "job message received");

        let value: serde_json::Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(e) => {
                error!(error = %e, "invalid JSON in job message, dropping");
                return;
            }
        };

        let value = template::expand_job(value);
        let job: JobMessage = match serde_json::from_value(value) {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "job message has invalid shape, dropping");
                return;
            }
        };

        {
            let mut stats = self.stats.lock().await;
            stats.jobs_received += 1;
        }
        info!(
            order_id = %job.order_id,
            page = job.page,
            total_pages = job.total_pages,
            elements = job.receipt_data.len(),
            "printing job"
        );

        let ops = DocumentRenderer::new().render(&job.receipt_data);

        let (outcome, printer_status) = {
            let mut printer = self.printer.lock().await;
            let outcome = printer.print_document(&ops);
            (outcome, printer.status())
        };

        match outcome {
            crate::printer::JobOutcome::Completed => {
                self.stats.lock().await.jobs_completed += 1;
                info!(order_id = %job.order_id, page = job.page, "job completed");
            }
            crate::printer::JobOutcome::Failed => {
                warn!(order_id = %job.order_id, page = job.page, "job failed");
                let record = ErrorRecord::new(
                    &self.settings.printer_id,
                    "print_failed",
                    "document aborted by device error",
                    printer_status.as_str(),
                );
                self.publish_json(client, &self.topics.error, &record).await;
            }
        }

        let record = StatusRecord::new(
            &self.settings.printer_id,
            &job.order_id,
            job.page,
            outcome.as_str(),
        );
        self.publish_json(client, &self.topics.status, &record).await;
    }

    async fn send_heartbeat(&self, client: &AsyncClient) {
        let snapshot = {
            let mut printer = self.printer.lock().await;
            printer.snapshot()
        };
        let record = HeartbeatRecord::new(
            &self.settings.printer_id,
            &snapshot,
            *self.state_tx.borrow() == ConnectionState::Connected,
            self.started_at.elapsed().as_millis() as u64,
        );
        self.publish_json(client, &self.topics.heartbeat, &record).await;
        debug!(topic = %self.topics.heartbeat, "heartbeat sent");
    }

    async fn publish_json<T: Serialize>(&self, client: &AsyncClient, topic: &str, record: &T) {
        if *self.state_tx.borrow() != ConnectionState::Connected {
            warn!(topic, "cannot publish while disconnected");
            return;
        }

        let payload = match serde_json::to_vec(record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, topic, "record serialization failed");
                return;
            }
        };

        match client.publish(topic, QoS::AtMostOnce, false, payload).await {
            Ok(()) => debug!(topic, "record published"),
            Err(e) => error!(error = %e, topic, "publish failed"),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
