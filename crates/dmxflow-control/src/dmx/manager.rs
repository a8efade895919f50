//! Sender fan-out
//!
//! Each configured sender runs as its own ticker task: snapshot the
//! universe, frame it for the wire, send. Senders are fully independent; a
//! slow or failing sender never holds up the others. The manager owns the
//! name -> sender table and the lifecycle (add, remove, force-frame,
//! status).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dmxflow_core::{
    SenderConfig, SenderProtocol, UniverseBuffer, UniverseSnapshot, UNIVERSE_SIZE,
};

use crate::dmx::artnet::{ArtNetSender, ARTNET_PORT};
use crate::dmx::log::LogSender;
use crate::dmx::sacn::{E131Sender, SACN_PORT};
use crate::{error::ControlError, Result};

/// Shared counters for one sender task
#[derive(Default)]
pub struct SenderStats {
    packets_sent: AtomicU64,
    send_errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl SenderStats {
    fn record_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    fn record_error(&self, error: &ControlError) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(error.to_string());
    }

    /// Frames put on the wire so far
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    /// Send failures so far, transient and fatal alike
    pub fn send_errors(&self) -> u64 {
        self.send_errors.load(Ordering::Relaxed)
    }

    /// Most recent send error, cleared by the next successful send
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

/// Status surface for one sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderStatus {
    pub name: String,
    pub protocol: SenderProtocol,
    pub target: String,
    pub universe: u16,
    pub fps: u32,
    pub packets_sent: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

enum WireSender {
    ArtNet(ArtNetSender),
    E131(E131Sender),
    Log(LogSender),
}

impl WireSender {
    async fn open(config: &SenderConfig) -> Result<Self> {
        match config.protocol {
            SenderProtocol::Artnet => {
                let port = config.port.unwrap_or(ARTNET_PORT);
                Ok(Self::ArtNet(
                    ArtNetSender::new(config.universe, &config.target, port).await?,
                ))
            }
            SenderProtocol::E131 => {
                let port = config.port.unwrap_or(SACN_PORT);
                Ok(Self::E131(
                    E131Sender::new(config.universe, &config.name, &config.target, port).await?,
                ))
            }
            SenderProtocol::Log => Ok(Self::Log(LogSender::new(config.universe))),
        }
    }

    async fn send_frame(&mut self, channels: &[u8; UNIVERSE_SIZE]) -> Result<()> {
        match self {
            Self::ArtNet(sender) => sender.send_frame(channels).await,
            Self::E131(sender) => sender.send_frame(channels).await,
            Self::Log(sender) => sender.send_frame(channels),
        }
    }
}

struct SenderEntry {
    config: SenderConfig,
    force_tx: mpsc::Sender<()>,
    stats: Arc<SenderStats>,
    task: JoinHandle<()>,
}

/// Manager for the set of running senders
pub struct DmxManager {
    universe: Arc<UniverseBuffer>,
    senders: tokio::sync::Mutex<HashMap<String, SenderEntry>>,
}

impl DmxManager {
    /// Create an empty manager reading from `universe`
    pub fn new(universe: Arc<UniverseBuffer>) -> Self {
        Self {
            universe,
            senders: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Add a sender and start its ticker.
    ///
    /// Fails with `Conflict` when the name is taken and `InvalidInput` when
    /// the configuration is out of range.
    pub async fn add(&self, config: SenderConfig) -> Result<()> {
        config.validate().map_err(ControlError::InvalidInput)?;

        let mut senders = self.senders.lock().await;
        if senders.contains_key(&config.name) {
            return Err(ControlError::Conflict(format!(
                "sender '{}' already exists",
                config.name
            )));
        }

        let wire = WireSender::open(&config).await?;
        let stats = Arc::new(SenderStats::default());
        let (force_tx, force_rx) = mpsc::channel(4);

        let worker = SenderWorker {
            name: config.name.clone(),
            config: config.clone(),
            wire,
            snapshot_rx: self.universe.subscribe(),
            force_rx,
            stats: Arc::clone(&stats),
        };
        let task = tokio::spawn(worker.run());

        info!(
            name = %config.name,
            protocol = ?config.protocol,
            universe = config.universe,
            fps = config.effective_fps(),
            "Sender added"
        );
        senders.insert(
            config.name.clone(),
            SenderEntry {
                config,
                force_tx,
                stats,
                task,
            },
        );
        Ok(())
    }

    /// Stop and remove a sender
    pub async fn remove(&self, name: &str) -> Result<()> {
        let entry = self
            .senders
            .lock()
            .await
            .remove(name)
            .ok_or_else(|| ControlError::NotFound(format!("sender '{name}'")))?;
        entry.task.abort();
        info!(name, "Sender removed");
        Ok(())
    }

    /// Force one immediate frame on one sender, or on all of them
    pub async fn force_frame(&self, name: Option<&str>) -> Result<()> {
        let senders = self.senders.lock().await;
        match name {
            Some(name) => {
                let entry = senders
                    .get(name)
                    .ok_or_else(|| ControlError::NotFound(format!("sender '{name}'")))?;
                let _ = entry.force_tx.try_send(());
            }
            None => {
                for entry in senders.values() {
                    let _ = entry.force_tx.try_send(());
                }
            }
        }
        Ok(())
    }

    /// Names of all running senders
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.senders.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Per-sender status
    pub async fn status(&self) -> Vec<SenderStatus> {
        let senders = self.senders.lock().await;
        let mut status: Vec<SenderStatus> = senders
            .values()
            .map(|entry| SenderStatus {
                name: entry.config.name.clone(),
                protocol: entry.config.protocol,
                target: entry.config.target.clone(),
                universe: entry.config.universe,
                fps: entry.config.effective_fps(),
                packets_sent: entry.stats.packets_sent(),
                last_error: entry.stats.last_error(),
            })
            .collect();
        status.sort_by(|a, b| a.name.cmp(&b.name));
        status
    }

    /// Configurations of all running senders
    pub async fn configs(&self) -> Vec<SenderConfig> {
        let senders = self.senders.lock().await;
        let mut configs: Vec<SenderConfig> =
            senders.values().map(|e| e.config.clone()).collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
    }

    /// The slowest effective fps across running senders, if any.
    ///
    /// The playback engine derives its tick rate from this after every
    /// add/remove.
    pub async fn slowest_fps(&self) -> Option<u32> {
        self.senders
            .lock()
            .await
            .values()
            .map(|entry| entry.config.effective_fps())
            .min()
    }

    /// Abort every sender task
    pub async fn shutdown(&self) {
        let mut senders = self.senders.lock().await;
        for (name, entry) in senders.drain() {
            entry.task.abort();
            debug!(name, "Sender stopped");
        }
    }
}

/// Backoff cap for reopen attempts
const REOPEN_BACKOFF_CAP: Duration = Duration::from_secs(30);

struct SenderWorker {
    name: String,
    config: SenderConfig,
    wire: WireSender,
    snapshot_rx: tokio::sync::watch::Receiver<UniverseSnapshot>,
    force_rx: mpsc::Receiver<()>,
    stats: Arc<SenderStats>,
}

impl SenderWorker {
    async fn run(mut self) {
        let period = Duration::from_secs_f64(1.0 / self.config.effective_fps() as f64);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        debug!(name = %self.name, period_ms = period.as_millis() as u64, "Sender worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                forced = self.force_rx.recv() => {
                    if forced.is_none() {
                        break;
                    }
                }
            }

            let frame: UniverseSnapshot = self.snapshot_rx.borrow().clone();
            match self.wire.send_frame(&frame).await {
                Ok(()) => self.stats.record_sent(),
                Err(e) if e.is_fatal_send() => {
                    self.stats.record_error(&e);
                    warn!(name = %self.name, error = %e, "Sender failed, reopening socket");
                    self.reopen().await;
                }
                Err(e) => {
                    // transient: logged and counted, the ticker continues
                    self.stats.record_error(&e);
                    warn!(name = %self.name, error = %e, "Frame send failed");
                }
            }
        }

        debug!(name = %self.name, "Sender worker stopped");
    }

    /// Reopen the socket with exponential backoff, 1 s doubling to 30 s
    async fn reopen(&mut self) {
        let mut delay = Duration::from_secs(1);
        loop {
            warn!(name = %self.name, delay_s = delay.as_secs(), "Reopening sender socket");
            tokio::time::sleep(delay).await;
            match WireSender::open(&self.config).await {
                Ok(wire) => {
                    info!(name = %self.name, "Sender socket reopened");
                    self.wire = wire;
                    return;
                }
                Err(e) => {
                    error!(name = %self.name, error = %e, "Reopen failed");
                    delay = (delay * 2).min(REOPEN_BACKOFF_CAP);
                }
            }
        }
    }
}
