//! Shared runtime context
//!
//! Both command dispatchers (MQTT router, REST handlers) operate on the same
//! set of handles: the engine queue, the sender manager, the shared show and
//! settings, the persistence store and the activity tracker. Bundling them
//! keeps the two boundaries symmetrical; each translates its own surface
//! into exactly one engine or manager operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use tokio::sync::watch;

use dmxflow_core::{
    ActivityTracker, ChannelUpdate, EngineHandle, FallbackConfig, RetransmitSettings,
    Settings, ShowState, UniverseBuffer,
};
use dmxflow_io::ConfigStore;

use crate::dmx::DmxManager;

/// Everything a dispatcher needs to execute commands
pub struct AppContext {
    /// Playback engine command queue
    pub engine: EngineHandle,
    /// The authoritative universe
    pub universe: Arc<UniverseBuffer>,
    /// Sender fan-out
    pub manager: Arc<DmxManager>,
    /// Shared show model, edited over REST and reloaded over MQTT
    pub show: Arc<RwLock<ShowState>>,
    /// Shared settings
    pub settings: Arc<RwLock<Settings>>,
    /// Persistence for both config files
    pub store: ConfigStore,
    /// Inactivity clock for the fallback watchdog
    pub activity: Arc<ActivityTracker>,
    /// Pushes fallback reconfiguration to the watchdog
    pub fallback_tx: watch::Sender<FallbackConfig>,
    /// Pushes retransmit reconfiguration to the retransmit loop
    pub retransmit_tx: watch::Sender<RetransmitSettings>,
    last_channel_update: Mutex<Option<ChannelUpdate>>,
    update_seq: AtomicU64,
}

impl AppContext {
    /// Bundle the handles into a context
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: EngineHandle,
        universe: Arc<UniverseBuffer>,
        manager: Arc<DmxManager>,
        show: Arc<RwLock<ShowState>>,
        settings: Arc<RwLock<Settings>>,
        store: ConfigStore,
        activity: Arc<ActivityTracker>,
        fallback_tx: watch::Sender<FallbackConfig>,
        retransmit_tx: watch::Sender<RetransmitSettings>,
    ) -> Self {
        Self {
            engine,
            universe,
            manager,
            show,
            settings,
            store,
            activity,
            fallback_tx,
            retransmit_tx,
            last_channel_update: Mutex::new(None),
            update_seq: AtomicU64::new(0),
        }
    }

    /// Record an MQTT-originated channel write for the UI poll endpoint
    pub fn record_channel_update(&self, channel: u16, value: u8) {
        let seq = self.update_seq.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_channel_update.lock() = Some(ChannelUpdate {
            channel,
            value,
            seq,
        });
    }

    /// The most recent MQTT-originated channel write, if any
    pub fn last_channel_update(&self) -> Option<ChannelUpdate> {
        *self.last_channel_update.lock()
    }

    /// Re-derive the engine tick rate from the running sender set.
    ///
    /// Called after every sender add/remove so the engine keeps following
    /// the slowest sender's fps.
    pub async fn sync_engine_tick(&self) {
        let hz = self
            .manager
            .slowest_fps()
            .await
            .unwrap_or(dmxflow_core::DEFAULT_FPS);
        if let Err(error) = self.engine.set_tick_rate(hz).await {
            tracing::warn!(%error, "Failed to update engine tick rate");
        }
    }
}
