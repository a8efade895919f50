//! Periodic universe retransmission
//!
//! When enabled, every sender emits one extra frame per interval, on top of
//! its normal fps cadence. This keeps late-joining fixtures in sync and
//! papers over UDP loss on flaky networks. Settings arrive over a watch
//! channel so the loop re-arms immediately when the interval or the enabled
//! flag changes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use dmxflow_core::RetransmitSettings;

use crate::dmx::manager::DmxManager;

/// The retransmit loop task
pub struct RetransmitLoop {
    manager: Arc<DmxManager>,
    settings_rx: watch::Receiver<RetransmitSettings>,
}

impl RetransmitLoop {
    /// Build the loop; `settings_rx` carries runtime reconfiguration
    pub fn new(
        manager: Arc<DmxManager>,
        settings_rx: watch::Receiver<RetransmitSettings>,
    ) -> Self {
        Self {
            manager,
            settings_rx,
        }
    }

    /// Spawn the loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Loop body: sleep one interval, force a frame everywhere, repeat
    pub async fn run(mut self) {
        info!("Retransmit loop started");
        loop {
            let settings = self.settings_rx.borrow().clone();

            if !settings.enabled {
                if self.settings_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }

            let interval = Duration::from_secs(settings.interval_seconds.max(1));
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    debug!(interval_s = interval.as_secs(), "Retransmitting universe");
                    let _ = self.manager.force_frame(None).await;
                }
                changed = self.settings_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Retransmit loop stopped");
    }
}
