use serde::{Deserialize, Serialize};

use crate::cursor::{CursorSettings, CursorSettingsPatch};
use crate::types::{Detection, GestureDefinition, GestureMap};

/// Inbound command envelope. Every client message is a self-describing
/// record with a `type` discriminator; unknown tags land on `Unknown`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    CameraStart,
    CameraStop,
    ToggleCursorMode {
        enabled: Option<bool>,
    },
    UpdateCursorSettings {
        settings: CursorSettingsPatch,
    },
    AddGesture {
        id: String,
        data: GestureDefinition,
    },
    DeleteGesture {
        id: String,
    },
    ToggleGesture {
        id: String,
        #[serde(default = "default_active")]
        active: bool,
    },
    StartRecording {
        id: String,
        total: Option<u32>,
    },
    StopRecording,
    Retrain,
    GetStats,
    #[serde(rename_all = "camelCase")]
    UpdateSettings {
        confidence_threshold: Option<f32>,
        cooldown: Option<f64>,
        buffer_size: Option<usize>,
    },
    GetGestures,
    #[serde(other)]
    Unknown,
}

fn default_active() -> bool {
    true
}

/// Decodes one raw client payload. Malformed payloads are dropped silently.
pub fn decode_command(raw: &str) -> Option<Command> {
    match serde_json::from_str(raw) {
        Ok(command) => Some(command),
        Err(err) => {
            log::debug!("dropping malformed command: {err}");
            None
        }
    }
}

/// Outbound event envelope, broadcast to observers or sent as a direct
/// reply. Field names follow the client protocol's camelCase convention.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    Connected {
        gestures: GestureMap,
        camera_on: bool,
        model_loaded: bool,
        accuracy: f32,
    },
    Frame {
        frame: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detection: Option<Detection>,
    },
    RecordingProgress {
        id: String,
        recorded: u32,
        total: u32,
        active: bool,
    },
    RecordingStarted {
        id: String,
        total: u32,
    },
    RecordingStopped {
        recorded: u32,
    },
    GestureUpdated {
        gestures: GestureMap,
    },
    CameraStatus {
        active: bool,
    },
    CursorModeChanged {
        enabled: bool,
    },
    CursorSettingsUpdated {
        settings: CursorSettings,
    },
    TrainProgress {
        progress: u8,
        accuracy: f32,
        status: String,
    },
    TrainComplete {
        accuracy: f32,
    },
    #[serde(rename_all = "camelCase")]
    Stats {
        accuracy: f32,
        total_gestures: usize,
        total_samples: usize,
        model_loaded: bool,
    },
    SettingsUpdated {
        status: &'static str,
    },
    Error {
        message: String,
    },
}
