//! Playback engine behavior under a paused tokio clock

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use tokio::sync::watch;

use dmxflow_core::engine::{EngineConfig, EngineHandle, PlaybackEngine};
use dmxflow_core::{
    ActivityTracker, CoreError, FallbackConfig, FallbackSlot, FallbackWatchdog, PlaybackKind,
    ProgrammableScene, Scene, Sequence, SequenceStep, ShowState, UniverseBuffer,
};

fn scene(values: &[(usize, u8)], len: usize) -> Scene {
    let mut channels = vec![Some(0u8); len];
    for &(i, v) in values {
        channels[i] = Some(v);
    }
    Scene {
        channels,
        ..Default::default()
    }
}

/// `red` lights channels 6 and 7 (1-based) at full
fn red_scene() -> Scene {
    scene(&[(5, 255), (6, 255)], 8)
}

fn setup(show: ShowState) -> (EngineHandle, Arc<UniverseBuffer>) {
    let universe = Arc::new(UniverseBuffer::default());
    let show = Arc::new(RwLock::new(show));
    let (engine, handle) = PlaybackEngine::new(EngineConfig::default(), universe.clone(), show);
    engine.spawn();
    (handle, universe)
}

#[tokio::test(start_paused = true)]
async fn test_static_scene_applies_immediately() {
    let mut show = ShowState::default();
    show.scenes.insert("red".into(), red_scene());
    let (engine, universe) = setup(show);

    universe.write(1, 17).unwrap();
    engine.play_scene("red", None).await.unwrap();

    let snap = universe.snapshot();
    assert_eq!(snap[5], 255);
    assert_eq!(snap[6], 255);
    // channel 1 was overwritten by the scene's explicit 0
    assert_eq!(snap[0], 0);

    let status = engine.status().await.unwrap();
    assert!(status.is_playing);
    assert_eq!(status.kind, Some(PlaybackKind::Scene));
    assert_eq!(status.name.as_deref(), Some("red"));
}

#[tokio::test(start_paused = true)]
async fn test_null_channels_carry_forward() {
    let mut show = ShowState::default();
    show.scenes.insert(
        "partial".into(),
        Scene {
            channels: vec![None, Some(40)],
            ..Default::default()
        },
    );
    let (engine, universe) = setup(show);

    universe.write(1, 123).unwrap();
    engine.play_scene("partial", None).await.unwrap();

    let snap = universe.snapshot();
    assert_eq!(snap[0], 123);
    assert_eq!(snap[1], 40);
}

#[tokio::test(start_paused = true)]
async fn test_transition_midpoint_and_completion() {
    let mut show = ShowState::default();
    show.scenes.insert("red".into(), red_scene());
    let (engine, universe) = setup(show);

    engine.play_scene("red", Some(1.0)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(505)).await;
    let snap = universe.snapshot();
    assert!((125..=130).contains(&snap[5]), "channel 6 was {}", snap[5]);
    assert!((125..=130).contains(&snap[6]), "channel 7 was {}", snap[6]);
    assert_eq!(snap[0], 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    let snap = universe.snapshot();
    assert_eq!(snap[5], 255);
    assert_eq!(snap[6], 255);
}

#[tokio::test(start_paused = true)]
async fn test_sequence_loops_like_modular_time() {
    let mut show = ShowState::default();
    show.scenes.insert("red".into(), scene(&[(0, 255)], 3));
    show.scenes.insert("green".into(), scene(&[(1, 255)], 3));
    show.scenes.insert("blue".into(), scene(&[(2, 255)], 3));
    let step = |name: &str| SequenceStep {
        scene: Some(name.to_string()),
        duration: Some(1000),
        ..Default::default()
    };
    show.sequences.insert(
        "rainbow".into(),
        Sequence {
            steps: vec![step("red"), step("green"), step("blue")],
            r#loop: true,
            description: None,
        },
    );
    let (engine, universe) = setup(show);

    engine.play_sequence("rainbow").await.unwrap();
    assert_eq!(universe.snapshot()[0], 255);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let snap = universe.snapshot();
    assert_eq!((snap[0], snap[1], snap[2]), (0, 255, 0), "green at 1.5s");

    // one full 3 s loop later the same step is active again
    tokio::time::sleep(Duration::from_millis(3000)).await;
    let snap = universe.snapshot();
    assert_eq!((snap[0], snap[1], snap[2]), (0, 255, 0), "green at 4.5s");

    let status = engine.status().await.unwrap();
    assert_eq!(status.step_index, Some(1));
    assert_eq!(status.step_count, Some(3));
}

#[tokio::test(start_paused = true)]
async fn test_sequence_without_loop_goes_idle() {
    let mut show = ShowState::default();
    show.sequences.insert(
        "one-shot".into(),
        Sequence {
            steps: vec![SequenceStep {
                dmx: BTreeMap::from([(1, 99)]),
                duration: Some(100),
                ..Default::default()
            }],
            r#loop: false,
            description: None,
        },
    );
    let (engine, universe) = setup(show);

    engine.play_sequence("one-shot").await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = engine.status().await.unwrap();
    assert!(!status.is_playing);
    // the last frame stays on the wire
    assert_eq!(universe.snapshot()[0], 99);
}

#[tokio::test(start_paused = true)]
async fn test_zero_duration_step_yields_one_tick() {
    let mut show = ShowState::default();
    show.sequences.insert(
        "flash".into(),
        Sequence {
            steps: vec![
                SequenceStep {
                    dmx: BTreeMap::from([(1, 100)]),
                    duration: Some(0),
                    ..Default::default()
                },
                SequenceStep {
                    dmx: BTreeMap::from([(1, 200)]),
                    duration: Some(1000),
                    ..Default::default()
                },
            ],
            r#loop: false,
            description: None,
        },
    );
    let (engine, universe) = setup(show);

    engine.play_sequence("flash").await.unwrap();
    assert_eq!(universe.snapshot()[0], 100);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(universe.snapshot()[0], 200);
}

#[tokio::test(start_paused = true)]
async fn test_tick_rate_change_applies_to_scheduling() {
    // zero-length steps hold for exactly one engine tick, which makes the
    // tick rate observable from outside
    let mut show = ShowState::default();
    show.sequences.insert(
        "flash".into(),
        Sequence {
            steps: vec![
                SequenceStep {
                    dmx: BTreeMap::from([(1, 100)]),
                    duration: Some(0),
                    ..Default::default()
                },
                SequenceStep {
                    dmx: BTreeMap::from([(1, 200)]),
                    duration: Some(1000),
                    ..Default::default()
                },
            ],
            r#loop: false,
            description: None,
        },
    );
    let (engine, universe) = setup(show);

    // 25 Hz: the zero-length step now holds 40 ms instead of 25 ms
    engine.set_tick_rate(25).await.unwrap();
    engine.play_sequence("flash").await.unwrap();
    assert_eq!(universe.snapshot()[0], 100);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(universe.snapshot()[0], 100, "still on step 0 at 30 ms");

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(universe.snapshot()[0], 200, "advanced after one 40 ms tick");
}

#[tokio::test(start_paused = true)]
async fn test_programmable_sine_wave() {
    let mut show = ShowState::default();
    show.programmable_scenes.insert(
        "pulse".into(),
        ProgrammableScene {
            name: "pulse".into(),
            duration: 10_000,
            r#loop: true,
            expressions: BTreeMap::from([(1, "255*sin(t)".to_string())]),
            description: None,
        },
    );
    let (engine, universe) = setup(show);

    engine.play_programmable("pulse").await.unwrap();
    // t = 0 frame
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(universe.snapshot()[0], 0);

    // near t = pi/2 the sine peaks
    tokio::time::sleep(Duration::from_millis(1575)).await;
    assert!(universe.snapshot()[0] >= 254);

    // near t = pi it crosses zero (negative half clamps to 0)
    tokio::time::sleep(Duration::from_millis(1575)).await;
    assert!(universe.snapshot()[0] <= 2);
}

#[tokio::test(start_paused = true)]
async fn test_programmable_loop_resets_time() {
    let mut show = ShowState::default();
    show.programmable_scenes.insert(
        "ramp".into(),
        ProgrammableScene {
            name: "ramp".into(),
            duration: 1_000,
            r#loop: true,
            expressions: BTreeMap::from([(1, "p".to_string())]),
            description: None,
        },
    );
    let (engine, universe) = setup(show);

    engine.play_programmable("ramp").await.unwrap();
    tokio::time::sleep(Duration::from_millis(900)).await;
    assert!(universe.snapshot()[0] >= 85);

    // past the duration the loop restarts and p is small again
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(universe.snapshot()[0] <= 15);

    let status = engine.status().await.unwrap();
    assert!(status.is_playing);
    assert_eq!(status.kind, Some(PlaybackKind::Programmable));
}

#[tokio::test(start_paused = true)]
async fn test_manual_write_preempts_transition() {
    let mut show = ShowState::default();
    show.scenes.insert("red".into(), red_scene());
    let (engine, universe) = setup(show);

    engine.play_scene("red", Some(5.0)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    engine.set_channel(6, 0).await.unwrap();
    assert_eq!(universe.snapshot()[5], 0);

    let status = engine.status().await.unwrap();
    assert!(!status.is_playing, "manual write must stop the transition");

    // no later transition tick may revive the fade
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(universe.snapshot()[5], 0);
}

#[tokio::test(start_paused = true)]
async fn test_play_replaces_play() {
    let mut show = ShowState::default();
    show.scenes.insert("red".into(), red_scene());
    show.programmable_scenes.insert(
        "pulse".into(),
        ProgrammableScene {
            name: "pulse".into(),
            duration: 10_000,
            r#loop: true,
            expressions: BTreeMap::from([(2, "255".to_string())]),
            description: None,
        },
    );
    let (engine, _universe) = setup(show);

    engine.play_programmable("pulse").await.unwrap();
    engine.play_scene("red", None).await.unwrap();

    let status = engine.status().await.unwrap();
    assert_eq!(status.kind, Some(PlaybackKind::Scene));
    assert_eq!(status.name.as_deref(), Some("red"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_names_fail_and_leave_state() {
    let (engine, _universe) = setup(ShowState::default());

    assert!(matches!(
        engine.play_scene("nope", None).await,
        Err(CoreError::SceneNotFound(_))
    ));
    assert!(matches!(
        engine.play_sequence("nope").await,
        Err(CoreError::SequenceNotFound(_))
    ));
    assert!(matches!(
        engine.play_programmable("nope").await,
        Err(CoreError::ProgrammableNotFound(_))
    ));

    let status = engine.status().await.unwrap();
    assert!(!status.is_playing);
}

#[tokio::test(start_paused = true)]
async fn test_stop_keeps_last_frame() {
    let mut show = ShowState::default();
    show.scenes.insert("red".into(), red_scene());
    let (engine, universe) = setup(show);

    engine.play_scene("red", None).await.unwrap();
    engine.stop().await.unwrap();

    assert!(!engine.status().await.unwrap().is_playing);
    assert_eq!(universe.snapshot()[5], 255);
}

#[tokio::test(start_paused = true)]
async fn test_blackout_zeroes_and_stops() {
    let mut show = ShowState::default();
    show.scenes.insert("red".into(), red_scene());
    let (engine, universe) = setup(show);

    engine.play_scene("red", None).await.unwrap();
    engine.blackout().await.unwrap();
    assert!(universe.snapshot().iter().all(|&v| v == 0));
    assert!(!engine.status().await.unwrap().is_playing);

    // a second blackout observes the same state
    engine.blackout().await.unwrap();
    assert!(universe.snapshot().iter().all(|&v| v == 0));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_channel_rejected() {
    let (engine, _universe) = setup(ShowState::default());
    assert!(matches!(
        engine.set_channel(0, 1).await,
        Err(CoreError::InvalidChannel(0))
    ));
    assert!(matches!(
        engine.set_channel(513, 1).await,
        Err(CoreError::InvalidChannel(513))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_bad_expression_pins_channel_to_zero() {
    let mut show = ShowState::default();
    show.programmable_scenes.insert(
        "broken".into(),
        ProgrammableScene {
            name: "broken".into(),
            duration: 1_000,
            r#loop: true,
            expressions: BTreeMap::from([
                (1, "255".to_string()),
                (2, "not_a_function(t)".to_string()),
            ]),
            description: None,
        },
    );
    let (engine, universe) = setup(show);

    // the play itself succeeds; only the broken channel is pinned
    engine.play_programmable("broken").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let snap = universe.snapshot();
    assert_eq!(snap[0], 255);
    assert_eq!(snap[1], 0);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_fires_and_rearms() {
    let mut show = ShowState::default();
    show.scenes.insert("dark".into(), scene(&[], 8));
    show.fallback = FallbackConfig {
        scene: Some(FallbackSlot {
            enabled: true,
            target: "dark".into(),
            delay_seconds: 2,
        }),
        sequence: None,
    };

    let fallback = show.fallback.clone();
    let (engine, universe) = setup(show);
    let activity = Arc::new(ActivityTracker::new());
    let (_config_tx, config_rx) = watch::channel(fallback);
    FallbackWatchdog::new(engine.clone(), activity.clone(), config_rx).spawn();

    engine.set_channel(1, 200).await.unwrap();
    activity.touch();
    assert_eq!(universe.snapshot()[0], 200);

    // no commands for just over the delay: the fallback scene lands
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(universe.snapshot()[0], 0);

    // activity re-arms it
    engine.set_channel(1, 150).await.unwrap();
    activity.touch();
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(universe.snapshot()[0], 150, "not yet expired");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(universe.snapshot()[0], 0, "fallback fired again");
}
