//! REST API routes and handlers
//!
//! Every mutating handler funnels into exactly one engine or manager
//! operation; edits to show artifacts are persisted to `config.json`
//! immediately, matching the MQTT `dmx/config/save` behavior.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};

use dmxflow_core::{
    AutostartConfig, ChannelUpdate, FallbackConfig, FollowerMap, PlaybackKind,
    PlaybackStatus, ProgrammableScene, RetransmitSettings, Scene, SenderConfig, Sequence,
    ShowState,
};

use crate::context::AppContext;
use crate::dmx::SenderStatus;
use crate::error::ControlError;
use crate::web::handlers::{
    AllChannelsRequest, ApiError, ApiResponse, ChannelValueRequest, FallbackDelayRequest,
    HealthResponse, PlaySceneRequest, ProgrammableRequest, SceneRequest, SequenceRequest,
    validate_channels,
};

type Ctx = State<Arc<AppContext>>;
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;
type CreatedResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// Build the API router
pub fn build_router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(get_config))
        .route("/api/scenes", get(list_scenes).post(create_scene))
        .route(
            "/api/scenes/:name",
            get(get_scene).put(update_scene).delete(delete_scene),
        )
        .route("/api/scenes/:name/play", post(play_scene))
        .route("/api/sequences", get(list_sequences).post(create_sequence))
        .route(
            "/api/sequences/:name",
            get(get_sequence).put(update_sequence).delete(delete_sequence),
        )
        .route("/api/sequences/:name/play", post(play_sequence))
        .route(
            "/api/programmable",
            get(list_programmables).post(create_programmable),
        )
        .route(
            "/api/programmable/:name",
            get(get_programmable)
                .put(update_programmable)
                .delete(delete_programmable),
        )
        .route("/api/programmable/:name/play", post(play_programmable))
        .route("/api/dmx/channel/:channel", post(set_channel))
        .route("/api/dmx/all", post(set_all_channels))
        .route("/api/dmx/blackout", post(blackout))
        .route("/api/dmx/channel-update", get(channel_update))
        .route("/api/playback/status", get(playback_status))
        .route("/api/playback/stop", post(playback_stop))
        .route(
            "/api/autostart",
            get(get_autostart).post(set_autostart).delete(clear_autostart),
        )
        .route(
            "/api/fallback",
            get(get_fallback).post(set_fallback).delete(clear_fallback),
        )
        .route(
            "/api/settings/dmx-retransmission",
            get(get_retransmit).post(set_retransmit),
        )
        .route(
            "/api/settings/dmx-followers",
            get(get_followers).post(set_followers),
        )
        .route("/api/settings/fallback-delay", post(set_fallback_delay))
        .route("/api/senders", get(list_senders).post(add_sender))
        .route("/api/senders/:name", axum::routing::delete(remove_sender))
}

fn persist_show(ctx: &AppContext) -> Result<(), ControlError> {
    let show = ctx.show.read().clone();
    ctx.store.save_show(&show)?;
    Ok(())
}

fn persist_settings(ctx: &AppContext) -> Result<(), ControlError> {
    let settings = ctx.settings.read().clone();
    ctx.store.save_settings(&settings)?;
    Ok(())
}

// --- service ---

/// GET /api/health
async fn health() -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy",
        service: "dmxflow",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/config - the whole show model
async fn get_config(State(ctx): Ctx) -> Json<ApiResponse<ShowState>> {
    let show = ctx.show.read().clone();
    Json(ApiResponse::success(show))
}

// --- scenes ---

/// GET /api/scenes
async fn list_scenes(State(ctx): Ctx) -> Json<ApiResponse<BTreeMap<String, Scene>>> {
    let scenes = ctx.show.read().scenes.clone();
    Json(ApiResponse::success(scenes))
}

/// POST /api/scenes
async fn create_scene(State(ctx): Ctx, Json(request): Json<SceneRequest>) -> CreatedResult<Scene> {
    let name = request
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ControlError::InvalidInput("missing scene name".to_string()))?;
    let scene = request.into_scene()?;
    ctx.show
        .write()
        .scenes
        .insert(name, scene.clone());
    persist_show(&ctx)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(scene))))
}

/// GET /api/scenes/:name
async fn get_scene(State(ctx): Ctx, Path(name): Path<String>) -> ApiResult<Scene> {
    let scene = ctx
        .show
        .read()
        .scene(&name)?
        .clone();
    Ok(Json(ApiResponse::success(scene)))
}

/// PUT /api/scenes/:name
async fn update_scene(
    State(ctx): Ctx,
    Path(name): Path<String>,
    Json(request): Json<SceneRequest>,
) -> ApiResult<Scene> {
    let scene = request.into_scene()?;
    {
        let mut show = ctx.show.write();
        if !show.scenes.contains_key(&name) {
            return Err(ControlError::NotFound(format!("scene '{name}'")).into());
        }
        show.scenes.insert(name, scene.clone());
    }
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(scene)))
}

/// DELETE /api/scenes/:name
async fn delete_scene(State(ctx): Ctx, Path(name): Path<String>) -> ApiResult<Scene> {
    let removed = ctx
        .show
        .write()
        .scenes
        .remove(&name)
        .ok_or_else(|| ControlError::NotFound(format!("scene '{name}'")))?;
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(removed)))
}

/// POST /api/scenes/:name/play
async fn play_scene(
    State(ctx): Ctx,
    Path(name): Path<String>,
    body: Option<Json<PlaySceneRequest>>,
) -> ApiResult<PlaybackStatus> {
    let transition = body.and_then(|Json(b)| b.transition_time);
    ctx.engine.play_scene(&name, transition).await?;
    ctx.activity.touch();
    Ok(Json(ApiResponse::success(ctx.engine.status().await?)))
}

// --- sequences ---

/// GET /api/sequences
async fn list_sequences(State(ctx): Ctx) -> Json<ApiResponse<BTreeMap<String, Sequence>>> {
    let sequences = ctx
        .show
        .read()
        .sequences
        .clone();
    Json(ApiResponse::success(sequences))
}

/// POST /api/sequences
async fn create_sequence(
    State(ctx): Ctx,
    Json(request): Json<SequenceRequest>,
) -> CreatedResult<Sequence> {
    let name = request
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ControlError::InvalidInput("missing sequence name".to_string()))?;
    request.validate()?;
    let sequence = Sequence {
        steps: request.steps,
        description: request.description,
        r#loop: request.r#loop,
    };
    ctx.show
        .write()
        .sequences
        .insert(name, sequence.clone());
    persist_show(&ctx)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(sequence))))
}

/// GET /api/sequences/:name
async fn get_sequence(State(ctx): Ctx, Path(name): Path<String>) -> ApiResult<Sequence> {
    let sequence = ctx
        .show
        .read()
        .sequence(&name)?
        .clone();
    Ok(Json(ApiResponse::success(sequence)))
}

/// PUT /api/sequences/:name
async fn update_sequence(
    State(ctx): Ctx,
    Path(name): Path<String>,
    Json(request): Json<SequenceRequest>,
) -> ApiResult<Sequence> {
    request.validate()?;
    let sequence = Sequence {
        steps: request.steps,
        description: request.description,
        r#loop: request.r#loop,
    };
    {
        let mut show = ctx.show.write();
        if !show.sequences.contains_key(&name) {
            return Err(ControlError::NotFound(format!("sequence '{name}'")).into());
        }
        show.sequences.insert(name, sequence.clone());
    }
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(sequence)))
}

/// DELETE /api/sequences/:name
async fn delete_sequence(State(ctx): Ctx, Path(name): Path<String>) -> ApiResult<Sequence> {
    let removed = ctx
        .show
        .write()
        .sequences
        .remove(&name)
        .ok_or_else(|| ControlError::NotFound(format!("sequence '{name}'")))?;
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(removed)))
}

/// POST /api/sequences/:name/play
async fn play_sequence(State(ctx): Ctx, Path(name): Path<String>) -> ApiResult<PlaybackStatus> {
    ctx.engine.play_sequence(&name).await?;
    ctx.activity.touch();
    Ok(Json(ApiResponse::success(ctx.engine.status().await?)))
}

// --- programmable scenes ---

/// GET /api/programmable
async fn list_programmables(
    State(ctx): Ctx,
) -> Json<ApiResponse<BTreeMap<String, ProgrammableScene>>> {
    let scenes = ctx
        .show
        .read()
        .programmable_scenes
        .clone();
    Json(ApiResponse::success(scenes))
}

/// POST /api/programmable
async fn create_programmable(
    State(ctx): Ctx,
    Json(request): Json<ProgrammableRequest>,
) -> CreatedResult<ProgrammableScene> {
    let name = request
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            ControlError::InvalidInput("missing programmable scene name".to_string())
        })?;
    let scene = request.into_scene(name.clone())?;
    ctx.show
        .write()
        .programmable_scenes
        .insert(name, scene.clone());
    persist_show(&ctx)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(scene))))
}

/// GET /api/programmable/:name
async fn get_programmable(
    State(ctx): Ctx,
    Path(name): Path<String>,
) -> ApiResult<ProgrammableScene> {
    let scene = ctx
        .show
        .read()
        .programmable(&name)?
        .clone();
    Ok(Json(ApiResponse::success(scene)))
}

/// PUT /api/programmable/:name
async fn update_programmable(
    State(ctx): Ctx,
    Path(name): Path<String>,
    Json(request): Json<ProgrammableRequest>,
) -> ApiResult<ProgrammableScene> {
    let scene = request.into_scene(name.clone())?;
    {
        let mut show = ctx.show.write();
        if !show.programmable_scenes.contains_key(&name) {
            return Err(
                ControlError::NotFound(format!("programmable scene '{name}'")).into(),
            );
        }
        show.programmable_scenes.insert(name, scene.clone());
    }
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(scene)))
}

/// DELETE /api/programmable/:name
async fn delete_programmable(
    State(ctx): Ctx,
    Path(name): Path<String>,
) -> ApiResult<ProgrammableScene> {
    let removed = ctx
        .show
        .write()
        .programmable_scenes
        .remove(&name)
        .ok_or_else(|| ControlError::NotFound(format!("programmable scene '{name}'")))?;
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(removed)))
}

/// POST /api/programmable/:name/play
async fn play_programmable(
    State(ctx): Ctx,
    Path(name): Path<String>,
) -> ApiResult<PlaybackStatus> {
    ctx.engine.play_programmable(&name).await?;
    ctx.activity.touch();
    Ok(Json(ApiResponse::success(ctx.engine.status().await?)))
}

// --- direct DMX ---

/// POST /api/dmx/channel/:channel
async fn set_channel(
    State(ctx): Ctx,
    Path(channel): Path<u16>,
    Json(request): Json<ChannelValueRequest>,
) -> ApiResult<()> {
    if !(0..=255).contains(&request.value) {
        return Err(
            ControlError::InvalidInput(format!("value must be 0-255, got {}", request.value))
                .into(),
        );
    }
    ctx.engine.set_channel(channel, request.value as u8).await?;
    ctx.activity.touch();
    Ok(Json(ApiResponse::success(())))
}

/// POST /api/dmx/all - apply a whole channel array as one batch
async fn set_all_channels(
    State(ctx): Ctx,
    Json(request): Json<AllChannelsRequest>,
) -> ApiResult<usize> {
    let channels = validate_channels(&request.channels)?;
    let writes: Vec<(u16, u8)> = channels
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|value| (i as u16 + 1, value)))
        .collect();
    let count = writes.len();
    ctx.engine.set_channels(writes).await?;
    ctx.activity.touch();
    Ok(Json(ApiResponse::success(count)))
}

/// POST /api/dmx/blackout
async fn blackout(State(ctx): Ctx) -> ApiResult<()> {
    ctx.engine.blackout().await?;
    ctx.manager.force_frame(None).await?;
    ctx.activity.touch();
    Ok(Json(ApiResponse::success(())))
}

/// GET /api/dmx/channel-update - the latest MQTT-originated channel write
async fn channel_update(State(ctx): Ctx) -> Json<ApiResponse<Option<ChannelUpdate>>> {
    Json(ApiResponse::success(ctx.last_channel_update()))
}

// --- playback ---

/// GET /api/playback/status
async fn playback_status(State(ctx): Ctx) -> ApiResult<PlaybackStatus> {
    Ok(Json(ApiResponse::success(ctx.engine.status().await?)))
}

/// POST /api/playback/stop
async fn playback_stop(State(ctx): Ctx) -> ApiResult<()> {
    ctx.engine.stop().await?;
    ctx.activity.touch();
    Ok(Json(ApiResponse::success(())))
}

// --- autostart ---

/// GET /api/autostart
async fn get_autostart(State(ctx): Ctx) -> Json<ApiResponse<Option<AutostartConfig>>> {
    let autostart = ctx.show.read().autostart.clone();
    Json(ApiResponse::success(autostart))
}

/// POST /api/autostart
async fn set_autostart(
    State(ctx): Ctx,
    Json(request): Json<AutostartConfig>,
) -> ApiResult<AutostartConfig> {
    {
        let mut show = ctx.show.write();
        let exists = match request.kind {
            PlaybackKind::Scene => show.scenes.contains_key(&request.name),
            PlaybackKind::Sequence => show.sequences.contains_key(&request.name),
            PlaybackKind::Programmable => {
                show.programmable_scenes.contains_key(&request.name)
            }
        };
        if !exists {
            return Err(ControlError::NotFound(format!(
                "{:?} '{}'",
                request.kind, request.name
            ))
            .into());
        }
        show.autostart = Some(request.clone());
    }
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(request)))
}

/// DELETE /api/autostart
async fn clear_autostart(State(ctx): Ctx) -> ApiResult<()> {
    ctx.show.write().autostart = None;
    persist_show(&ctx)?;
    Ok(Json(ApiResponse::success(())))
}

// --- fallback ---

/// GET /api/fallback
async fn get_fallback(State(ctx): Ctx) -> Json<ApiResponse<FallbackConfig>> {
    let fallback = ctx.show.read().fallback.clone();
    Json(ApiResponse::success(fallback))
}

/// POST /api/fallback
async fn set_fallback(
    State(ctx): Ctx,
    Json(request): Json<FallbackConfig>,
) -> ApiResult<FallbackConfig> {
    ctx.show.write().fallback = request.clone();
    persist_show(&ctx)?;
    let _ = ctx.fallback_tx.send(request.clone());
    Ok(Json(ApiResponse::success(request)))
}

/// DELETE /api/fallback
async fn clear_fallback(State(ctx): Ctx) -> ApiResult<()> {
    let disabled = FallbackConfig::default();
    ctx.show.write().fallback = disabled.clone();
    persist_show(&ctx)?;
    let _ = ctx.fallback_tx.send(disabled);
    Ok(Json(ApiResponse::success(())))
}

/// POST /api/settings/fallback-delay - adjust delays on the armed slots
async fn set_fallback_delay(
    State(ctx): Ctx,
    Json(request): Json<FallbackDelayRequest>,
) -> ApiResult<FallbackConfig> {
    let fallback = {
        let mut show = ctx.show.write();
        if let (Some(slot), Some(seconds)) = (&mut show.fallback.scene, request.scene_seconds)
        {
            slot.delay_seconds = seconds;
        }
        if let (Some(slot), Some(seconds)) =
            (&mut show.fallback.sequence, request.sequence_seconds)
        {
            slot.delay_seconds = seconds;
        }
        show.fallback.clone()
    };
    persist_show(&ctx)?;
    let _ = ctx.fallback_tx.send(fallback.clone());
    Ok(Json(ApiResponse::success(fallback)))
}

// --- settings ---

/// GET /api/settings/dmx-retransmission
async fn get_retransmit(State(ctx): Ctx) -> Json<ApiResponse<RetransmitSettings>> {
    let retransmit = ctx
        .settings
        .read()
        .retransmit
        .clone();
    Json(ApiResponse::success(retransmit))
}

/// POST /api/settings/dmx-retransmission
async fn set_retransmit(
    State(ctx): Ctx,
    Json(request): Json<RetransmitSettings>,
) -> ApiResult<RetransmitSettings> {
    if request.interval_seconds == 0 {
        return Err(
            ControlError::InvalidInput("interval must be at least 1 second".to_string()).into(),
        );
    }
    ctx.settings
        .write()
        .retransmit = request.clone();
    persist_settings(&ctx)?;
    let _ = ctx.retransmit_tx.send(request.clone());
    Ok(Json(ApiResponse::success(request)))
}

/// GET /api/settings/dmx-followers
async fn get_followers(State(ctx): Ctx) -> Json<ApiResponse<FollowerMap>> {
    let followers = ctx
        .settings
        .read()
        .followers
        .clone();
    Json(ApiResponse::success(followers))
}

/// POST /api/settings/dmx-followers
async fn set_followers(
    State(ctx): Ctx,
    Json(mut request): Json<FollowerMap>,
) -> ApiResult<FollowerMap> {
    let dropped = request.sanitize();
    if dropped > 0 {
        tracing::warn!(dropped, "Follower map entries dropped during sanitize");
    }
    ctx.universe.set_followers(request.clone());
    ctx.settings
        .write()
        .followers = request.clone();
    persist_settings(&ctx)?;
    Ok(Json(ApiResponse::success(request)))
}

// --- senders ---

/// GET /api/senders
async fn list_senders(State(ctx): Ctx) -> Json<ApiResponse<Vec<SenderStatus>>> {
    Json(ApiResponse::success(ctx.manager.status().await))
}

/// POST /api/senders
async fn add_sender(
    State(ctx): Ctx,
    Json(request): Json<SenderConfig>,
) -> CreatedResult<SenderConfig> {
    ctx.manager.add(request.clone()).await?;
    ctx.sync_engine_tick().await;
    {
        let mut settings = ctx.settings.write();
        settings.senders.retain(|s| s.name != request.name);
        settings.senders.push(request.clone());
    }
    persist_settings(&ctx)?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(request))))
}

/// DELETE /api/senders/:name
async fn remove_sender(State(ctx): Ctx, Path(name): Path<String>) -> ApiResult<()> {
    ctx.manager.remove(&name).await?;
    ctx.sync_engine_tick().await;
    ctx.settings.write().senders.retain(|s| s.name != name);
    persist_settings(&ctx)?;
    Ok(Json(ApiResponse::success(())))
}
