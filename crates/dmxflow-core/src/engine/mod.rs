//! The playback engine
//!
//! A single task owns the playback state. Every mutation arrives on one
//! command queue and is processed to completion before the next, which gives
//! the ordering guarantees the rest of the system relies on: last play wins,
//! manual channel writes preempt whatever is running, and a sender snapshot
//! never contains half of a transition frame.
//!
//! The engine wakes at the earliest of the next transition tick, the next
//! sequence step boundary or the next programmable tick; when idle it only
//! wakes for commands.

mod activity;
mod transition;

pub use activity::{ActivityTracker, FallbackWatchdog};
pub use transition::Transition;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::expr::Expr;
use crate::settings::PlaybackDefaults;
use crate::show::{PlaybackKind, SequenceStep, ShowState};
use crate::universe::{UniverseBuffer, UNIVERSE_SIZE};

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tick rate for transitions and programmable scenes, clamped to
    /// 25..=60 Hz
    pub tick_hz: u32,
    /// Defaults applied when commands omit transition or step durations
    pub defaults: PlaybackDefaults,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_hz: 40,
            defaults: PlaybackDefaults::default(),
        }
    }
}

/// Commands accepted by the engine task
enum EngineCommand {
    PlayScene {
        name: String,
        transition_seconds: Option<f64>,
        reply: oneshot::Sender<Result<()>>,
    },
    PlaySequence {
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    PlayProgrammable {
        name: String,
        reply: oneshot::Sender<Result<()>>,
    },
    SetChannel {
        channel: u16,
        value: u8,
        reply: oneshot::Sender<Result<()>>,
    },
    SetChannels {
        writes: Vec<(u16, u8)>,
        reply: oneshot::Sender<Result<()>>,
    },
    Blackout {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    Status {
        reply: oneshot::Sender<PlaybackStatus>,
    },
    SetTickRate {
        hz: u32,
    },
}

/// Read-only view of the playback state, sampled atomically by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    /// False only in the `Idle` state
    pub is_playing: bool,
    /// Kind of the active playback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<PlaybackKind>,
    /// Name of the active artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Current step index for sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// Total steps for sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_count: Option<usize>,
    /// The step currently applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_data: Option<SequenceStep>,
    /// Progress through the transition, step or cycle, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
}

/// Cloneable handle used by dispatchers to drive the engine
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    async fn send<T>(
        &self,
        command: EngineCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CoreError::EngineGone)?;
        rx.await.map_err(|_| CoreError::EngineGone)
    }

    /// Apply a scene, optionally fading over `transition_seconds`
    pub async fn play_scene(&self, name: &str, transition_seconds: Option<f64>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineCommand::PlayScene {
                name: name.to_string(),
                transition_seconds,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Start a sequence from step 0
    pub async fn play_sequence(&self, name: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineCommand::PlaySequence {
                name: name.to_string(),
                reply,
            },
            rx,
        )
        .await?
    }

    /// Start a programmable scene
    pub async fn play_programmable(&self, name: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineCommand::PlayProgrammable {
                name: name.to_string(),
                reply,
            },
            rx,
        )
        .await?
    }

    /// Write one channel; stops any active playback first
    pub async fn set_channel(&self, channel: u16, value: u8) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(
            EngineCommand::SetChannel {
                channel,
                value,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Write a batch of channels; stops any active playback first
    pub async fn set_channels(&self, writes: Vec<(u16, u8)>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::SetChannels { writes, reply }, rx)
            .await?
    }

    /// Stop playback and zero the universe
    pub async fn blackout(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Blackout { reply }, rx).await?
    }

    /// Cancel playback, leaving the universe at its last values
    pub async fn stop(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Stop { reply }, rx).await?
    }

    /// Sample the playback state
    pub async fn status(&self) -> Result<PlaybackStatus> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::Status { reply }, rx).await
    }

    /// Re-derive the tick rate, normally from the slowest sender's fps.
    ///
    /// Clamped to 25..=60 Hz; takes effect from the next scheduled tick.
    pub async fn set_tick_rate(&self, hz: u32) -> Result<()> {
        self.tx
            .send(EngineCommand::SetTickRate { hz })
            .await
            .map_err(|_| CoreError::EngineGone)
    }
}

struct ResolvedStep {
    writes: Vec<(u16, u8)>,
    duration: Duration,
    fade: Option<Duration>,
    raw: SequenceStep,
}

struct SequenceRun {
    name: String,
    steps: Vec<ResolvedStep>,
    index: usize,
    step_started: Instant,
    looped: bool,
    fade: Option<Transition>,
}

impl SequenceRun {
    /// How long the current step holds; zero-length steps hold for one tick
    /// so the engine never busy-loops
    fn hold(&self, tick: Duration) -> Duration {
        let duration = self.steps[self.index].duration;
        if duration.is_zero() {
            tick
        } else {
            duration
        }
    }

    fn step_end(&self, tick: Duration) -> Instant {
        self.step_started + self.hold(tick)
    }
}

struct ProgrammableRun {
    name: String,
    channels: Vec<(u16, Expr)>,
    started: Instant,
    duration: Duration,
    looped: bool,
    /// Channels that already reported an evaluation error this run
    failed: Vec<u16>,
}

enum Active {
    Idle,
    Static {
        name: String,
        fade: Option<Transition>,
    },
    Sequence(SequenceRun),
    Programmable(ProgrammableRun),
}

/// The engine task. Construct with [`PlaybackEngine::new`], then call
/// [`spawn`](PlaybackEngine::spawn).
pub struct PlaybackEngine {
    universe: Arc<UniverseBuffer>,
    show: Arc<RwLock<ShowState>>,
    rx: mpsc::Receiver<EngineCommand>,
    tick: Duration,
    defaults: PlaybackDefaults,
    active: Active,
    next_tick: Instant,
    generation: u64,
}

impl PlaybackEngine {
    /// Create the engine and its command handle
    pub fn new(
        config: EngineConfig,
        universe: Arc<UniverseBuffer>,
        show: Arc<RwLock<ShowState>>,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel(64);
        let tick_hz = config.tick_hz.clamp(25, 60);
        let engine = Self {
            universe,
            show,
            rx,
            tick: Duration::from_secs_f64(1.0 / tick_hz as f64),
            defaults: config.defaults,
            active: Active::Idle,
            next_tick: Instant::now(),
            generation: 0,
        };
        (engine, EngineHandle { tx })
    }

    /// Spawn the engine loop
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Engine main loop: process commands, wake at the next scheduled event
    pub async fn run(mut self) {
        info!(tick_ms = self.tick.as_millis() as u64, "Playback engine started");
        loop {
            let command = match self.next_deadline() {
                Some(deadline) => {
                    tokio::select! {
                        command = self.rx.recv() => match command {
                            Some(c) => Some(c),
                            None => break,
                        },
                        _ = tokio::time::sleep_until(deadline) => None,
                    }
                }
                None => match self.rx.recv().await {
                    Some(c) => Some(c),
                    None => break,
                },
            };

            match command {
                Some(command) => self.handle_command(command),
                None => self.on_tick(Instant::now()),
            }
        }
        info!("Playback engine stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        match &self.active {
            Active::Idle => None,
            Active::Static { fade: Some(_), .. } => Some(self.next_tick),
            Active::Static { fade: None, .. } => None,
            Active::Sequence(run) => {
                let step_end = run.step_end(self.tick);
                if run.fade.is_some() {
                    Some(step_end.min(self.next_tick))
                } else {
                    Some(step_end)
                }
            }
            Active::Programmable(_) => Some(self.next_tick),
        }
    }

    fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::PlayScene {
                name,
                transition_seconds,
                reply,
            } => {
                let result = self.play_scene(&name, transition_seconds);
                let _ = reply.send(result);
            }
            EngineCommand::PlaySequence { name, reply } => {
                let result = self.play_sequence(&name);
                let _ = reply.send(result);
            }
            EngineCommand::PlayProgrammable { name, reply } => {
                let result = self.play_programmable(&name);
                let _ = reply.send(result);
            }
            EngineCommand::SetChannel {
                channel,
                value,
                reply,
            } => {
                // manual writes preempt automation: a channel has one author
                self.cancel_playback();
                let _ = reply.send(self.universe.write(channel, value));
            }
            EngineCommand::SetChannels { writes, reply } => {
                self.cancel_playback();
                let _ = reply.send(self.universe.write_many(&writes));
            }
            EngineCommand::Blackout { reply } => {
                self.cancel_playback();
                self.universe.blackout();
                let _ = reply.send(Ok(()));
            }
            EngineCommand::Stop { reply } => {
                self.cancel_playback();
                let _ = reply.send(Ok(()));
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.status());
            }
            EngineCommand::SetTickRate { hz } => {
                let clamped = hz.clamp(25, 60);
                self.tick = Duration::from_secs_f64(1.0 / clamped as f64);
                info!(tick_hz = clamped, "Engine tick rate updated");
            }
        }
    }

    fn cancel_playback(&mut self) {
        if !matches!(self.active, Active::Idle) {
            debug!(generation = self.generation, "Cancelling active playback");
        }
        self.generation += 1;
        self.active = Active::Idle;
    }

    fn play_scene(&mut self, name: &str, transition_seconds: Option<f64>) -> Result<()> {
        let scene = self.show.read().scene(name)?.clone();
        let writes = scene.to_writes()?;
        let seconds = transition_seconds
            .or_else(|| scene.fade_ms.map(|ms| ms as f64 / 1000.0))
            .unwrap_or(self.defaults.transition_seconds);

        let now = Instant::now();
        self.generation += 1;
        if seconds > 0.0 && !writes.is_empty() {
            let start: [u8; UNIVERSE_SIZE] = *self.universe.snapshot();
            let fade = Transition::new(start, writes, now, Duration::from_secs_f64(seconds));
            self.next_tick = now + self.tick;
            self.active = Active::Static {
                name: name.to_string(),
                fade: Some(fade),
            };
        } else {
            self.universe.write_many(&writes)?;
            self.active = Active::Static {
                name: name.to_string(),
                fade: None,
            };
        }
        info!(scene = name, transition_s = seconds, "Scene started");
        Ok(())
    }

    fn play_sequence(&mut self, name: &str) -> Result<()> {
        let steps = {
            let show = self.show.read();
            let sequence = show.sequence(name)?;
            if sequence.steps.is_empty() {
                return Err(CoreError::InvalidPlayback(format!(
                    "sequence '{name}' has no steps"
                )));
            }
            let mut resolved = Vec::with_capacity(sequence.steps.len());
            for step in &sequence.steps {
                step.validate()?;
                let writes = match &step.scene {
                    Some(scene_name) => show.scene(scene_name)?.to_writes()?,
                    None => step.dmx.iter().map(|(&c, &v)| (c, v)).collect(),
                };
                resolved.push(ResolvedStep {
                    writes,
                    duration: Duration::from_millis(
                        step.duration.unwrap_or(self.defaults.step_duration_ms),
                    ),
                    fade: step.fade.map(Duration::from_millis),
                    raw: step.clone(),
                });
            }
            (resolved, sequence.r#loop)
        };

        let now = Instant::now();
        self.generation += 1;
        let mut run = SequenceRun {
            name: name.to_string(),
            steps: steps.0,
            index: 0,
            step_started: now,
            looped: steps.1,
            fade: None,
        };
        self.enter_step(&mut run, now);
        info!(sequence = name, steps = run.steps.len(), "Sequence started");
        self.active = Active::Sequence(run);
        Ok(())
    }

    fn play_programmable(&mut self, name: &str) -> Result<()> {
        let scene = self
            .show
            .read()
            .programmable(name)?
            .clone();
        if scene.duration == 0 {
            return Err(CoreError::InvalidPlayback(format!(
                "programmable scene '{name}' has zero duration"
            )));
        }

        let mut channels = Vec::with_capacity(scene.expressions.len());
        for (&channel, source) in &scene.expressions {
            if !(1..=UNIVERSE_SIZE as u16).contains(&channel) {
                warn!(channel, scene = name, "Expression channel out of range, skipping");
                continue;
            }
            match Expr::compile(source) {
                Ok(expr) => channels.push((channel, expr)),
                Err(error) => {
                    // surfaced once here; the channel emits 0 for the run
                    warn!(channel, scene = name, %error, "Expression failed to compile, channel pinned to 0");
                    channels.push((channel, Expr::Num(0.0)));
                }
            }
        }

        let now = Instant::now();
        self.generation += 1;
        self.active = Active::Programmable(ProgrammableRun {
            name: name.to_string(),
            channels,
            started: now,
            duration: Duration::from_millis(scene.duration),
            looped: scene.r#loop,
            failed: Vec::new(),
        });
        // evaluate the t=0 frame on the next loop pass
        self.next_tick = now;
        info!(scene = name, "Programmable scene started");
        Ok(())
    }

    /// Apply the current step of a sequence run
    fn enter_step(&mut self, run: &mut SequenceRun, now: Instant) {
        run.step_started = now;
        let step = &run.steps[run.index];
        match step.fade {
            Some(fade) if !fade.is_zero() => {
                let start: [u8; UNIVERSE_SIZE] = *self.universe.snapshot();
                run.fade = Some(Transition::new(start, step.writes.clone(), now, fade));
                self.next_tick = now + self.tick;
            }
            _ => {
                run.fade = None;
                if let Err(error) = self.universe.write_many(&step.writes) {
                    warn!(%error, step = run.index, "Step write failed");
                }
            }
        }
    }

    fn on_tick(&mut self, now: Instant) {
        let mut finished = false;
        let universe = Arc::clone(&self.universe);
        let tick = self.tick;

        let mut advance_to: Option<usize> = None;
        match &mut self.active {
            Active::Idle => {}
            Active::Static { fade, .. } => {
                if let Some(transition) = fade.take() {
                    let frame = transition.frame_at(now);
                    let _ = universe.write_many(&frame);
                    if !transition.finished(now) {
                        *fade = Some(transition);
                        self.next_tick = now + tick;
                    }
                }
            }
            Active::Sequence(run) => {
                if let Some(transition) = run.fade.take() {
                    let frame = transition.frame_at(now);
                    let _ = universe.write_many(&frame);
                    if !transition.finished(now) {
                        run.fade = Some(transition);
                        self.next_tick = now + tick;
                    }
                }
                if now >= run.step_end(tick) {
                    if run.index + 1 < run.steps.len() {
                        advance_to = Some(run.index + 1);
                    } else if run.looped {
                        advance_to = Some(0);
                    } else {
                        debug!(sequence = %run.name, "Sequence finished");
                        finished = true;
                    }
                }
            }
            Active::Programmable(run) => {
                let mut elapsed = now.saturating_duration_since(run.started);
                if elapsed >= run.duration {
                    if run.looped {
                        run.started = now;
                        run.failed.clear();
                        elapsed = Duration::ZERO;
                    } else {
                        debug!(scene = %run.name, "Programmable scene finished");
                        finished = true;
                    }
                }
                if !finished {
                    let t = elapsed.as_secs_f64();
                    let p = (100.0 * elapsed.as_secs_f64() * 1000.0
                        / run.duration.as_millis() as f64)
                        .min(100.0);
                    let mut writes = Vec::with_capacity(run.channels.len());
                    for (channel, expr) in &run.channels {
                        match expr.eval_dmx(t, p) {
                            Ok(value) => writes.push((*channel, value)),
                            Err(error) => {
                                if !run.failed.contains(channel) {
                                    warn!(channel, %error, "Expression evaluation failed, emitting 0");
                                    run.failed.push(*channel);
                                }
                                writes.push((*channel, 0));
                            }
                        }
                    }
                    let _ = universe.write_many(&writes);
                    self.next_tick = now + tick;
                }
            }
        }

        if let Some(index) = advance_to {
            if let Active::Sequence(mut run) = std::mem::replace(&mut self.active, Active::Idle) {
                run.index = index;
                self.enter_step(&mut run, now);
                self.active = Active::Sequence(run);
            }
        }

        if finished {
            self.active = Active::Idle;
        }
    }

    fn status(&self) -> PlaybackStatus {
        let now = Instant::now();
        match &self.active {
            Active::Idle => PlaybackStatus::default(),
            Active::Static { name, fade } => PlaybackStatus {
                is_playing: true,
                kind: Some(PlaybackKind::Scene),
                name: Some(name.clone()),
                progress_percent: Some(
                    fade.as_ref().map(|t| t.progress(now) * 100.0).unwrap_or(100.0),
                ),
                ..Default::default()
            },
            Active::Sequence(run) => {
                let hold = run.hold(self.tick);
                let elapsed = now.saturating_duration_since(run.step_started);
                let progress = if hold.is_zero() {
                    100.0
                } else {
                    (elapsed.as_secs_f64() / hold.as_secs_f64() * 100.0).min(100.0)
                };
                PlaybackStatus {
                    is_playing: true,
                    kind: Some(PlaybackKind::Sequence),
                    name: Some(run.name.clone()),
                    step_index: Some(run.index),
                    step_count: Some(run.steps.len()),
                    step_data: Some(run.steps[run.index].raw.clone()),
                    progress_percent: Some(progress),
                }
            }
            Active::Programmable(run) => {
                let elapsed = now.saturating_duration_since(run.started);
                let progress = (100.0 * elapsed.as_secs_f64()
                    / run.duration.as_secs_f64())
                .min(100.0);
                PlaybackStatus {
                    is_playing: true,
                    kind: Some(PlaybackKind::Programmable),
                    name: Some(run.name.clone()),
                    progress_percent: Some(progress),
                    ..Default::default()
                }
            }
        }
    }
}
