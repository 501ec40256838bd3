use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::actions::Action;

/// Number of keypoints on the hand skeleton produced by the landmark provider.
pub const LANDMARK_COUNT: usize = 21;

/// Raw per-frame hand keypoints as (x, y, z) in [0, 1] image space.
pub type Landmarks = [[f32; 3]; LANDMARK_COUNT];

/// Cursor action a custom-trained gesture can be mapped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorAction {
    LeftClick,
    RightClick,
    Drag,
}

/// A user-defined gesture: training label, bound desktop action, enable flag.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureDefinition {
    pub name: String,
    pub action: Action,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_action: Option<CursorAction>,
}

fn default_active() -> bool {
    true
}

/// Gesture table keyed by stable id. BTreeMap keeps persisted JSON stable.
pub type GestureMap = BTreeMap<String, GestureDefinition>;

/// Per-frame classification outcome attached to a broadcast frame.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub gesture: String,
    pub gesture_id: Option<String>,
    pub confidence: f32,
    pub action: Option<Action>,
    pub fired: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gesture_definition_round_trip() {
        let json = r#"{"name":"wave","action":"alt_tab","active":false}"#;
        let def: GestureDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.name, "wave");
        assert_eq!(def.action, Action::AltTab);
        assert!(!def.active);
        assert!(def.cursor_action.is_none());

        let back = serde_json::to_string(&def).unwrap();
        let again: GestureDefinition = serde_json::from_str(&back).unwrap();
        assert_eq!(again.action, Action::AltTab);
    }

    #[test]
    fn active_defaults_to_true() {
        let json = r#"{"name":"fist","action":"play_pause"}"#;
        let def: GestureDefinition = serde_json::from_str(json).unwrap();
        assert!(def.active);
    }

    #[test]
    fn cursor_gesture_carries_mapping() {
        let json = r#"{"name":"snap","action":"cursor_action","cursorAction":"left_click"}"#;
        let def: GestureDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.action, Action::CursorAction);
        assert_eq!(def.cursor_action, Some(CursorAction::LeftClick));
    }
}
