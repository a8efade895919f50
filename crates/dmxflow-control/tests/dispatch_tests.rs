//! MQTT command execution against a live engine
//!
//! The client is never polled, so publishes just queue; these tests cover
//! the routing and the engine side effects.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use rumqttc::{AsyncClient, MqttOptions};
use tempfile::TempDir;
use tokio::sync::watch;

use dmxflow_control::context::AppContext;
use dmxflow_control::dmx::DmxManager;
use dmxflow_control::mqtt::{execute, router, MqttCommand};
use dmxflow_core::engine::{EngineConfig, PlaybackEngine};
use dmxflow_core::{
    ActivityTracker, FallbackConfig, RetransmitSettings, Scene, SenderConfig, SenderProtocol,
    Settings, ShowState, UniverseBuffer,
};
use dmxflow_io::ConfigStore;

fn context(show: ShowState) -> (Arc<AppContext>, AsyncClient, TempDir, rumqttc::EventLoop) {
    let dir = TempDir::new().unwrap();
    let store = ConfigStore::new(dir.path());

    let universe = Arc::new(UniverseBuffer::default());
    let show = Arc::new(RwLock::new(show));
    let settings = Arc::new(RwLock::new(Settings::default()));

    let (engine, handle) =
        PlaybackEngine::new(EngineConfig::default(), Arc::clone(&universe), Arc::clone(&show));
    engine.spawn();

    let manager = Arc::new(DmxManager::new(Arc::clone(&universe)));
    let (fallback_tx, _) = watch::channel(FallbackConfig::default());
    let (retransmit_tx, _) = watch::channel(RetransmitSettings::default());

    let ctx = Arc::new(AppContext::new(
        handle,
        universe,
        manager,
        show,
        settings,
        store,
        Arc::new(ActivityTracker::new()),
        fallback_tx,
        retransmit_tx,
    ));

    // never polled; publishes only queue up
    let (client, event_loop) = AsyncClient::new(MqttOptions::new("test", "127.0.0.1", 1883), 64);
    (ctx, client, dir, event_loop)
}

#[tokio::test]
async fn test_set_channel_command() {
    let (ctx, client, _dir, _event_loop) = context(ShowState::default());

    let command = router::route("dmx/set/channel/3", "200", &HashSet::new())
        .unwrap()
        .unwrap();
    execute(&ctx, &client, command).await.unwrap();

    assert_eq!(ctx.universe.snapshot()[2], 200);
    // MQTT writes are mirrored to the UI poll endpoint
    let update = ctx.last_channel_update().unwrap();
    assert_eq!((update.channel, update.value), (3, 200));
}

#[tokio::test]
async fn test_scene_command_with_sequence_topic() {
    let mut show = ShowState::default();
    show.scenes.insert(
        "red".to_string(),
        Scene {
            channels: vec![Some(255)],
            ..Default::default()
        },
    );
    let (ctx, client, _dir, _event_loop) = context(show);

    let command = router::route("dmx/scene/red", "", &HashSet::new())
        .unwrap()
        .unwrap();
    execute(&ctx, &client, command).await.unwrap();
    assert_eq!(ctx.universe.snapshot()[0], 255);
}

#[tokio::test]
async fn test_unknown_scene_errors() {
    let (ctx, client, _dir, _event_loop) = context(ShowState::default());
    let command = MqttCommand::PlayScene {
        name: "ghost".to_string(),
        transition_seconds: None,
    };
    assert!(execute(&ctx, &client, command).await.is_err());
}

#[tokio::test]
async fn test_blackout_command() {
    let (ctx, client, _dir, _event_loop) = context(ShowState::default());
    ctx.engine.set_channel(1, 50).await.unwrap();

    execute(&ctx, &client, MqttCommand::Blackout { sender: None })
        .await
        .unwrap();
    assert!(ctx.universe.snapshot().iter().all(|&v| v == 0));
}

#[tokio::test]
async fn test_remove_sender_command() {
    let (ctx, client, _dir, _event_loop) = context(ShowState::default());
    ctx.manager
        .add(SenderConfig {
            name: "main".to_string(),
            protocol: SenderProtocol::Log,
            target: String::new(),
            universe: 1,
            fps: 40,
            port: None,
        })
        .await
        .unwrap();

    execute(
        &ctx,
        &client,
        MqttCommand::RemoveSender {
            name: "main".to_string(),
        },
    )
    .await
    .unwrap();
    assert!(ctx.manager.names().await.is_empty());

    // removing again is a NotFound error
    assert!(execute(
        &ctx,
        &client,
        MqttCommand::RemoveSender {
            name: "main".to_string()
        }
    )
    .await
    .is_err());
}

#[tokio::test]
async fn test_config_save_writes_files() {
    let (ctx, client, dir, _event_loop) = context(ShowState::default());

    execute(&ctx, &client, MqttCommand::ConfigSave).await.unwrap();
    assert!(dir.path().join("settings.json").exists());
    assert!(dir.path().join("config.json").exists());
}

#[tokio::test]
async fn test_status_and_list_publish() {
    let (ctx, client, _dir, _event_loop) = context(ShowState::default());

    // queueing the replies must succeed even while disconnected
    execute(&ctx, &client, MqttCommand::SenderStatus).await.unwrap();
    execute(&ctx, &client, MqttCommand::SenderList).await.unwrap();
}
