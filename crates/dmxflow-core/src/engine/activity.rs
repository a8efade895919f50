//! Command activity tracking and the inactivity fallback watchdog
//!
//! The dispatchers stamp every state-changing command into the
//! [`ActivityTracker`]. The watchdog waits for the armed fallback slot whose
//! delay expires first and, when the idle period elapses, pushes the
//! configured scene or sequence through the normal engine command path. A
//! fallback fires at most once per idle period: it does not count as
//! activity itself, so it never re-arms its own timer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::EngineHandle;
use crate::show::{FallbackConfig, PlaybackKind};

/// Monotonic "last command" timestamp shared by all command sources
pub struct ActivityTracker {
    last: Mutex<Instant>,
    notify: Notify,
}

impl ActivityTracker {
    /// Start the idle clock at "now"
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
            notify: Notify::new(),
        }
    }

    /// Record a state-changing command
    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
        self.notify.notify_waiters();
    }

    /// Timestamp of the most recent command
    pub fn last_activity(&self) -> Instant {
        *self.last.lock()
    }

    /// Resolves on the next [`touch`](Self::touch)
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Watches command activity and triggers the configured fallback
pub struct FallbackWatchdog {
    engine: EngineHandle,
    activity: Arc<ActivityTracker>,
    config_rx: watch::Receiver<FallbackConfig>,
}

impl FallbackWatchdog {
    /// Build a watchdog; the config channel allows runtime re-arming
    pub fn new(
        engine: EngineHandle,
        activity: Arc<ActivityTracker>,
        config_rx: watch::Receiver<FallbackConfig>,
    ) -> Self {
        Self {
            engine,
            activity,
            config_rx,
        }
    }

    /// Spawn the watchdog loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Watchdog main loop
    pub async fn run(mut self) {
        info!("Fallback watchdog started");
        // the activity timestamp we already fired for, if any
        let mut fired_for: Option<Instant> = None;

        loop {
            let config = self.config_rx.borrow().clone();
            let armed = config.next_to_fire().map(|(kind, slot)| (kind, slot.clone()));

            let Some((kind, slot)) = armed else {
                tokio::select! {
                    changed = self.config_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = self.activity.changed() => {}
                }
                continue;
            };

            let last = self.activity.last_activity();
            if fired_for == Some(last) {
                // already fired for this idle period; wait for something new
                tokio::select! {
                    changed = self.config_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        fired_for = None;
                    }
                    _ = self.activity.changed() => {}
                }
                continue;
            }

            let deadline = last + Duration::from_secs(slot.delay_seconds);
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    fired_for = Some(last);
                    info!(target = %slot.target, ?kind, "Inactivity fallback triggered");
                    let result = match kind {
                        PlaybackKind::Scene => {
                            self.engine.play_scene(&slot.target, None).await
                        }
                        PlaybackKind::Sequence => {
                            self.engine.play_sequence(&slot.target).await
                        }
                        PlaybackKind::Programmable => {
                            self.engine.play_programmable(&slot.target).await
                        }
                    };
                    if let Err(error) = result {
                        warn!(%error, target = %slot.target, "Fallback playback failed");
                    }
                }
                changed = self.config_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("Fallback configuration changed, re-arming");
                    fired_for = None;
                }
                _ = self.activity.changed() => {}
            }
        }
        info!("Fallback watchdog stopped");
    }
}
