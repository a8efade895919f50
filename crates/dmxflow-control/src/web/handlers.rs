//! HTTP request/response types and validation
//!
//! Validation mirrors the MQTT boundary: channels 1-512, values 0-255 or
//! null, non-negative durations, expressions that compile. Anything that
//! fails here is rejected with 400 before it can reach the engine.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use dmxflow_core::{
    CoreError, Expr, ProgrammableScene, Scene, SequenceStep, UNIVERSE_SIZE,
};

use crate::error::ControlError;

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Error wrapper that maps the control taxonomy onto status codes
pub struct ApiError(pub ControlError);

impl<E: Into<ControlError>> From<E> for ApiError {
    fn from(error: E) -> Self {
        Self(error.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ControlError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ControlError::NotFound(_) => StatusCode::NOT_FOUND,
            ControlError::Conflict(_) => StatusCode::CONFLICT,
            ControlError::Core(core) => match core {
                CoreError::SceneNotFound(_)
                | CoreError::SequenceNotFound(_)
                | CoreError::ProgrammableNotFound(_) => StatusCode::NOT_FOUND,
                CoreError::InvalidChannel(_)
                | CoreError::InvalidValue(_)
                | CoreError::Expr(_)
                | CoreError::InvalidPlayback(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ApiResponse::<()>::error(self.0.to_string()))).into_response()
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Body for scene create/update
#[derive(Debug, Deserialize)]
pub struct SceneRequest {
    /// Required on create, ignored on update
    #[serde(default)]
    pub name: Option<String>,
    pub channels: Vec<Option<i64>>,
    #[serde(default)]
    pub fade_ms: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl SceneRequest {
    /// Validate the channel vector into a scene
    pub fn into_scene(self) -> Result<Scene, ControlError> {
        Ok(Scene {
            channels: validate_channels(&self.channels)?,
            fade_ms: self.fade_ms,
            description: self.description,
        })
    }
}

/// Validate a raw channel array: values must be null or 0-255
pub fn validate_channels(raw: &[Option<i64>]) -> Result<Vec<Option<u8>>, ControlError> {
    if raw.len() > UNIVERSE_SIZE {
        return Err(ControlError::InvalidInput(format!(
            "channel array has {} entries (max {UNIVERSE_SIZE})",
            raw.len()
        )));
    }
    raw.iter()
        .enumerate()
        .map(|(i, value)| match value {
            None => Ok(None),
            Some(v) if (0..=255).contains(v) => Ok(Some(*v as u8)),
            Some(v) => Err(ControlError::InvalidInput(format!(
                "channel {} value must be null or 0-255, got {v}",
                i + 1
            ))),
        })
        .collect()
}

/// Body for sequence create/update
#[derive(Debug, Deserialize)]
pub struct SequenceRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<SequenceStep>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub r#loop: bool,
}

impl SequenceRequest {
    /// Validate every step
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.steps.is_empty() {
            return Err(ControlError::InvalidInput(
                "sequence needs at least one step".to_string(),
            ));
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.validate().map_err(|e| {
                ControlError::InvalidInput(format!("step {}: {e}", i + 1))
            })?;
            if step.scene.is_none() && step.dmx.is_empty() {
                return Err(ControlError::InvalidInput(format!(
                    "step {} needs a scene reference or a dmx map",
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

/// Body for programmable scene create/update
#[derive(Debug, Deserialize)]
pub struct ProgrammableRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub duration: u64,
    #[serde(default)]
    pub r#loop: bool,
    pub expressions: BTreeMap<u16, String>,
}

impl ProgrammableRequest {
    /// Validate duration, channel range and that every expression compiles
    pub fn into_scene(self, name: String) -> Result<ProgrammableScene, ControlError> {
        if self.duration == 0 {
            return Err(ControlError::InvalidInput(
                "duration must be positive".to_string(),
            ));
        }
        for (&channel, source) in &self.expressions {
            if !(1..=UNIVERSE_SIZE as u16).contains(&channel) {
                return Err(ControlError::InvalidInput(format!(
                    "expression channel {channel} out of range (1-{UNIVERSE_SIZE})"
                )));
            }
            Expr::compile(source).map_err(|e| {
                ControlError::InvalidInput(format!("channel {channel}: {e}"))
            })?;
        }
        Ok(ProgrammableScene {
            name,
            description: self.description,
            duration: self.duration,
            r#loop: self.r#loop,
            expressions: self.expressions,
        })
    }
}

/// Body for `POST /api/dmx/channel/{n}`
#[derive(Debug, Deserialize)]
pub struct ChannelValueRequest {
    pub value: i64,
}

/// Body for `POST /api/dmx/all`
#[derive(Debug, Deserialize)]
pub struct AllChannelsRequest {
    pub channels: Vec<Option<i64>>,
}

/// Body for `POST /api/scenes/{id}/play`
#[derive(Debug, Default, Deserialize)]
pub struct PlaySceneRequest {
    #[serde(default)]
    pub transition_time: Option<f64>,
}

/// Body for `POST /api/settings/fallback-delay`
#[derive(Debug, Deserialize)]
pub struct FallbackDelayRequest {
    #[serde(default)]
    pub scene_seconds: Option<u64>,
    #[serde(default)]
    pub sequence_seconds: Option<u64>,
}
