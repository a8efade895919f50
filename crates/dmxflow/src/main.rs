//! DmxFlow - MQTT + REST driven DMX512 show controller
//!
//! Wires the playback core to its boundaries: loads the two config files,
//! starts the engine, the sender fan-out, the retransmit loop, the fallback
//! watchdog, the MQTT ingest and the REST server, then waits for shutdown.
//!
//! Exit codes: 0 normal, 1 fatal startup error (bad config, cannot bind),
//! 2 broker unreachable after maximum backoff with `--require-broker`.

mod logging_setup;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{error, info, warn};

use dmxflow_control::{AppContext, DmxManager, MqttService, RetransmitLoop, WebServer};
use dmxflow_core::engine::{EngineConfig, EngineHandle, PlaybackEngine};
use dmxflow_core::{ActivityTracker, FallbackWatchdog, PlaybackKind, Settings, UniverseBuffer};
use dmxflow_io::ConfigStore;

/// DMX512 show controller driven by MQTT and REST
#[derive(Parser, Debug)]
#[command(name = "dmxflow", version, about)]
struct Cli {
    /// Directory containing settings.json and config.json
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Print the active configuration and exit
    #[arg(long)]
    show_config: bool,

    /// Exit instead of retrying forever when the broker stays unreachable
    #[arg(long)]
    require_broker: bool,

    /// More verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let store = ConfigStore::new(&cli.config_dir);

    let settings = match store.load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Fatal: cannot load settings: {e}");
            return ExitCode::from(1);
        }
    };
    let show = match store.load_show() {
        Ok(show) => show,
        Err(e) => {
            eprintln!("Fatal: cannot load show config: {e}");
            return ExitCode::from(1);
        }
    };

    if cli.show_config {
        print_config_summary(&settings, &show);
        return ExitCode::SUCCESS;
    }

    let _log_guard = match logging_setup::init(&settings.logging, cli.verbose, cli.quiet) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Fatal: cannot initialize logging: {e}");
            return ExitCode::from(1);
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_dir = %cli.config_dir.display(),
        "DmxFlow starting"
    );

    // --- core ---
    let universe = Arc::new(UniverseBuffer::new(settings.followers.clone()));
    let show_shared = Arc::new(RwLock::new(show.clone()));
    let settings_shared = Arc::new(RwLock::new(settings.clone()));

    let engine_config = EngineConfig {
        tick_hz: settings.engine_tick_hz(),
        defaults: settings.playback.clone(),
    };
    let (engine, engine_handle) =
        PlaybackEngine::new(engine_config, Arc::clone(&universe), Arc::clone(&show_shared));
    engine.spawn();

    // --- senders ---
    let manager = Arc::new(DmxManager::new(Arc::clone(&universe)));
    for sender in &settings.senders {
        if let Err(e) = manager.add(sender.clone()).await {
            warn!(name = %sender.name, error = %e, "Skipping sender from settings");
        }
    }

    let (retransmit_tx, retransmit_rx) = watch::channel(settings.retransmit.clone());
    RetransmitLoop::new(Arc::clone(&manager), retransmit_rx).spawn();

    // --- fallback watchdog ---
    let activity = Arc::new(ActivityTracker::new());
    let (fallback_tx, fallback_rx) = watch::channel(show.fallback.clone());
    FallbackWatchdog::new(engine_handle.clone(), Arc::clone(&activity), fallback_rx).spawn();

    // --- dispatchers ---
    let ctx = Arc::new(AppContext::new(
        engine_handle.clone(),
        Arc::clone(&universe),
        Arc::clone(&manager),
        show_shared,
        settings_shared,
        store,
        activity,
        fallback_tx,
        retransmit_tx,
    ));

    if let Some(autostart) = &show.autostart {
        run_autostart(&engine_handle, autostart.kind, &autostart.name).await;
    }

    let web_task = WebServer::new(settings.web.clone()).spawn(Arc::clone(&ctx));
    let mqtt_task = MqttService::new(Arc::clone(&ctx), cli.require_broker).spawn();

    info!(senders = manager.names().await.len(), "DmxFlow running");

    // --- run until shutdown ---
    let exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            ExitCode::SUCCESS
        }
        result = mqtt_task => {
            match result {
                Ok(Err(e)) => {
                    error!(error = %e, "MQTT task failed");
                    ExitCode::from(2)
                }
                Ok(Ok(())) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "MQTT task panicked");
                    ExitCode::from(1)
                }
            }
        }
        result = web_task => {
            match result {
                Ok(Err(e)) => {
                    error!(error = %e, "Web server failed");
                    ExitCode::from(1)
                }
                _ => ExitCode::SUCCESS,
            }
        }
    };

    // stop the tickers, then give in-flight sends a moment to drain
    manager.shutdown().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    info!("Shutdown complete");
    exit
}

async fn run_autostart(engine: &EngineHandle, kind: PlaybackKind, name: &str) {
    info!(?kind, name, "Autostart");
    let result = match kind {
        PlaybackKind::Scene => engine.play_scene(name, None).await,
        PlaybackKind::Sequence => engine.play_sequence(name).await,
        PlaybackKind::Programmable => engine.play_programmable(name).await,
    };
    if let Err(e) = result {
        warn!(name, error = %e, "Autostart failed");
    }
}

fn print_config_summary(settings: &Settings, show: &dmxflow_core::ShowState) {
    println!("DmxFlow configuration");
    println!("=====================");
    println!("MQTT url:        {}", settings.mqtt.url);
    println!("MQTT client id:  {}", settings.mqtt.client_id);
    println!("Web binding:     {}:{}", settings.web.host, settings.web.port);
    println!("Senders ({}):", settings.senders.len());
    for sender in &settings.senders {
        println!(
            "  {} ({:?}) universe {} target '{}' fps {}",
            sender.name,
            sender.protocol,
            sender.universe,
            sender.target,
            sender.effective_fps()
        );
    }
    println!(
        "Followers:       {} ({} leaders)",
        if settings.followers.enabled { "enabled" } else { "disabled" },
        settings.followers.map.len()
    );
    println!(
        "Retransmit:      {} every {} s",
        if settings.retransmit.enabled { "enabled" } else { "disabled" },
        settings.retransmit.interval_seconds
    );
    println!(
        "Show:            {} scenes, {} sequences, {} programmable",
        show.scenes.len(),
        show.sequences.len(),
        show.programmable_scenes.len()
    );
    if let Some(autostart) = &show.autostart {
        println!("Autostart:       {:?} '{}'", autostart.kind, autostart.name);
    }
}
