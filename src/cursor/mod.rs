pub mod geometry;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::AppConfig;
use crate::types::{CursorAction, Landmarks};
use geometry::{INDEX_TIP, MIDDLE_TIP, RING_TIP};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
}

/// Injected pointing-device capability. Failures are logged and swallowed so
/// a misbehaving desktop never stalls the frame pipeline.
pub trait PointerBackend: Send {
    fn screen_size(&mut self) -> (u32, u32);
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn click(&mut self, button: PointerButton) -> Result<()>;
    fn click_at(&mut self, x: i32, y: i32) -> Result<()>;
    fn press(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
    fn scroll(&mut self, amount: i32) -> Result<()>;
}

/// Pointer backend that only logs. Used when no automation feature is
/// compiled in.
pub struct NoopPointer;

impl PointerBackend for NoopPointer {
    fn screen_size(&mut self) -> (u32, u32) {
        (1920, 1080)
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        log::trace!("noop pointer: move to {x},{y}");
        Ok(())
    }

    fn click(&mut self, button: PointerButton) -> Result<()> {
        log::debug!("noop pointer: click {button:?}");
        Ok(())
    }

    fn click_at(&mut self, x: i32, y: i32) -> Result<()> {
        log::debug!("noop pointer: click at {x},{y}");
        Ok(())
    }

    fn press(&mut self) -> Result<()> {
        log::debug!("noop pointer: press");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        log::debug!("noop pointer: release");
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        log::debug!("noop pointer: scroll {amount}");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeftClickTrigger {
    ThumbIndexPinch,
    ThumbMiddlePinch,
    Fist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RightClickTrigger {
    ThumbMiddlePinch,
    ThumbRingPinch,
    ThreeFingerPinch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DragTrigger {
    Fist,
    PinchHold,
    AllFingersPinch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollTrigger {
    TwoFingers,
    ThreeFingers,
    OpenPalm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickSelectMode {
    Disabled,
    PointThenPinch,
    PointThenFist,
}

/// User-selectable trigger bindings for the cursor mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CursorSettings {
    pub left_click: LeftClickTrigger,
    pub right_click: RightClickTrigger,
    pub drag: DragTrigger,
    pub scroll: ScrollTrigger,
    pub click_select: ClickSelectMode,
}

impl Default for CursorSettings {
    fn default() -> Self {
        Self {
            left_click: LeftClickTrigger::ThumbIndexPinch,
            right_click: RightClickTrigger::ThumbMiddlePinch,
            drag: DragTrigger::Fist,
            scroll: ScrollTrigger::TwoFingers,
            click_select: ClickSelectMode::PointThenPinch,
        }
    }
}

/// Partial settings update; absent fields keep their current binding.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct CursorSettingsPatch {
    pub left_click: Option<LeftClickTrigger>,
    pub right_click: Option<RightClickTrigger>,
    pub drag: Option<DragTrigger>,
    pub scroll: Option<ScrollTrigger>,
    pub click_select: Option<ClickSelectMode>,
}

/// Geometry thresholds and motion tuning, sourced from configuration.
#[derive(Clone, Copy, Debug)]
pub struct CursorTuning {
    pub pinch_threshold: f32,
    pub fist_threshold: f32,
    pub palm_threshold: f32,
    pub all_pinch_threshold: f32,
    pub dead_zone: f32,
    pub smoothing: f32,
    pub scroll_gain: f32,
    pub scroll_dead_zone: f32,
}

impl CursorTuning {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            pinch_threshold: cfg.pinch_threshold,
            fist_threshold: cfg.fist_threshold,
            palm_threshold: cfg.palm_threshold,
            all_pinch_threshold: cfg.all_pinch_threshold,
            dead_zone: cfg.dead_zone,
            smoothing: cfg.smoothing,
            scroll_gain: cfg.scroll_gain,
            scroll_dead_zone: cfg.scroll_dead_zone,
        }
    }
}

/// Interprets raw keypoints as pointer-control primitives: absolute movement
/// with dead zone and smoothing, rising-edge clicks, drag toggling, scroll,
/// and the two-phase click-to-select protocol.
pub struct CursorGestureEngine {
    settings: CursorSettings,
    tuning: CursorTuning,
    screen: (u32, u32),
    last_pos: Option<(i32, i32)>,
    dragging: bool,
    last_click_state: bool,
    select_armed: bool,
    target_pos: Option<(i32, i32)>,
    custom: HashMap<String, CursorAction>,
}

impl CursorGestureEngine {
    pub fn new(settings: CursorSettings, tuning: CursorTuning, screen: (u32, u32)) -> Self {
        Self {
            settings,
            tuning,
            screen,
            last_pos: None,
            dragging: false,
            last_click_state: false,
            select_armed: false,
            target_pos: None,
            custom: HashMap::new(),
        }
    }

    pub fn settings(&self) -> CursorSettings {
        self.settings
    }

    pub fn apply_settings(&mut self, patch: CursorSettingsPatch) -> CursorSettings {
        if let Some(v) = patch.left_click {
            self.settings.left_click = v;
        }
        if let Some(v) = patch.right_click {
            self.settings.right_click = v;
        }
        if let Some(v) = patch.drag {
            self.settings.drag = v;
        }
        if let Some(v) = patch.scroll {
            self.settings.scroll = v;
        }
        if let Some(v) = patch.click_select {
            self.settings.click_select = v;
        }
        log::info!("cursor settings updated: {:?}", self.settings);
        self.settings
    }

    pub fn register_custom(&mut self, name: impl Into<String>, action: CursorAction) {
        let name = name.into();
        log::info!("custom cursor gesture mapped: {name} -> {action:?}");
        self.custom.insert(name, action);
    }

    /// Runs the built-in geometric detectors for one cursor-mode frame.
    pub fn run_builtins(&mut self, lm: &Landmarks, pointer: &mut dyn PointerBackend) {
        self.handle_clicks(lm, pointer);
        self.handle_drag(lm, pointer);
        self.handle_scroll(lm, pointer);
    }

    /// Maps the index fingertip to screen coordinates, applying the dead zone
    /// and exponential smoothing against the previous position.
    pub fn move_cursor(&mut self, lm: &Landmarks, pointer: &mut dyn PointerBackend) {
        let tip = lm[INDEX_TIP];
        let (w, h) = self.screen;
        let mut target_x = (tip[0] * w as f32) as i32;
        let mut target_y = (tip[1] * h as f32) as i32;

        if let Some((lx, ly)) = self.last_pos {
            let dx = (target_x - lx).abs() as f32 / w as f32;
            let dy = (target_y - ly).abs() as f32 / h as f32;
            if dx < self.tuning.dead_zone && dy < self.tuning.dead_zone {
                return;
            }
            let s = self.tuning.smoothing;
            target_x = (lx as f32 * (1.0 - s) + target_x as f32 * s) as i32;
            target_y = (ly as f32 * (1.0 - s) + target_y as f32 * s) as i32;
        }

        match pointer.move_to(target_x, target_y) {
            Ok(()) => self.last_pos = Some((target_x, target_y)),
            Err(err) => log::debug!("cursor move failed: {err:?}"),
        }
    }

    /// Rising-edge left/right clicks plus the click-to-select protocol.
    /// Ordinary left clicks are suppressed while click-to-select is armed.
    pub fn handle_clicks(&mut self, lm: &Landmarks, pointer: &mut dyn PointerBackend) {
        let t = self.tuning.pinch_threshold;
        let thumb_index = geometry::is_pinch(lm, INDEX_TIP, t);
        let thumb_middle = geometry::is_pinch(lm, MIDDLE_TIP, t);
        let thumb_ring = geometry::is_pinch(lm, RING_TIP, t);
        let fist = geometry::is_fist(lm, self.tuning.fist_threshold);
        let pointing = geometry::extended_fingers(lm) == 1;

        let left = match self.settings.left_click {
            LeftClickTrigger::ThumbIndexPinch => thumb_index,
            LeftClickTrigger::ThumbMiddlePinch => thumb_middle,
            LeftClickTrigger::Fist => fist,
        };
        let right = match self.settings.right_click {
            RightClickTrigger::ThumbMiddlePinch => thumb_middle,
            RightClickTrigger::ThumbRingPinch => thumb_ring,
            RightClickTrigger::ThreeFingerPinch => thumb_middle && thumb_ring,
        };

        // Suppression uses the armed state at frame entry so the confirm
        // frame itself cannot double as an ordinary click.
        let was_armed = self.select_armed;
        if self.settings.click_select != ClickSelectMode::Disabled {
            if !self.select_armed {
                if pointing {
                    self.select_armed = true;
                    self.target_pos = self.last_pos;
                    log::info!("click-to-select armed at {:?}", self.target_pos);
                }
            } else {
                let confirm = match self.settings.click_select {
                    ClickSelectMode::PointThenPinch => thumb_index,
                    ClickSelectMode::PointThenFist => fist,
                    ClickSelectMode::Disabled => false,
                };
                if confirm {
                    if let Some((x, y)) = self.target_pos {
                        match pointer.click_at(x, y) {
                            Ok(()) => log::info!("click-to-select fired at {x},{y}"),
                            Err(err) => log::debug!("click-to-select failed: {err:?}"),
                        }
                    }
                    self.select_armed = false;
                    self.target_pos = None;
                }
            }
        }

        if left && !self.last_click_state && !was_armed {
            if let Err(err) = pointer.click(PointerButton::Left) {
                log::debug!("left click failed: {err:?}");
            }
        }
        if right && !self.last_click_state {
            if let Err(err) = pointer.click(PointerButton::Right) {
                log::debug!("right click failed: {err:?}");
            }
        }
        self.last_click_state = left || right;
    }

    /// Drag is a toggle: starts on the trigger's rising edge, ends when the
    /// trigger clears. Repeated frames in the same state are no-ops.
    pub fn handle_drag(&mut self, lm: &Landmarks, pointer: &mut dyn PointerBackend) {
        let triggered = match self.settings.drag {
            DragTrigger::Fist => geometry::is_fist(lm, self.tuning.fist_threshold),
            DragTrigger::PinchHold => {
                geometry::is_pinch(lm, INDEX_TIP, self.tuning.pinch_threshold)
            }
            DragTrigger::AllFingersPinch => {
                geometry::is_fist(lm, self.tuning.all_pinch_threshold)
            }
        };

        if triggered && !self.dragging {
            match pointer.press() {
                Ok(()) => {
                    self.dragging = true;
                    log::info!("drag started");
                }
                Err(err) => log::debug!("drag start failed: {err:?}"),
            }
        } else if !triggered && self.dragging {
            match pointer.release() {
                Ok(()) => {
                    self.dragging = false;
                    log::info!("drag ended");
                }
                Err(err) => log::debug!("drag end failed: {err:?}"),
            }
        }
    }

    /// Scroll while the configured finger condition holds; magnitude follows
    /// the middle fingertip's vertical displacement from the last cursor Y.
    pub fn handle_scroll(&mut self, lm: &Landmarks, pointer: &mut dyn PointerBackend) {
        let extended = geometry::extended_fingers(lm);
        let active = match self.settings.scroll {
            ScrollTrigger::TwoFingers => extended == 2,
            ScrollTrigger::ThreeFingers => extended == 3,
            ScrollTrigger::OpenPalm => geometry::is_open_palm(lm, self.tuning.palm_threshold),
        };
        if !active {
            return;
        }
        let Some((_, ly)) = self.last_pos else {
            return;
        };

        let dy = lm[MIDDLE_TIP][1] - ly as f32 / self.screen.1 as f32;
        if dy.abs() > self.tuning.scroll_dead_zone {
            let amount = (dy * self.tuning.scroll_gain) as i32;
            if let Err(err) = pointer.scroll(-amount) {
                log::debug!("scroll failed: {err:?}");
            }
        }
    }

    /// Executes the mapped cursor action for a custom-trained gesture label.
    /// Returns true when the label is mapped; built-in detectors are then
    /// skipped for the frame.
    pub fn handle_custom(&mut self, label: &str, pointer: &mut dyn PointerBackend) -> bool {
        let Some(action) = self.custom.get(label).copied() else {
            return false;
        };

        let outcome = match action {
            CursorAction::LeftClick => pointer.click(PointerButton::Left),
            CursorAction::RightClick => pointer.click(PointerButton::Right),
            CursorAction::Drag => {
                if self.dragging {
                    pointer.release().inspect(|_| self.dragging = false)
                } else {
                    pointer.press().inspect(|_| self.dragging = true)
                }
            }
        };
        if let Err(err) = outcome {
            log::debug!("custom cursor action {action:?} failed: {err:?}");
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn select_armed(&self) -> bool {
        self.select_armed
    }

    #[cfg(test)]
    pub(crate) fn set_last_pos(&mut self, pos: (i32, i32)) {
        self.last_pos = Some(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::geometry::testing::{open_hand, pinch_hand, pointing_hand};
    use super::geometry::{INDEX_TIP, MIDDLE_TIP};
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        MoveTo(i32, i32),
        Click(PointerButton),
        ClickAt(i32, i32),
        Press,
        Release,
        Scroll(i32),
    }

    #[derive(Clone, Default)]
    struct MockPointer {
        calls: Arc<Mutex<Vec<Call>>>,
    }

    impl MockPointer {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl PointerBackend for MockPointer {
        fn screen_size(&mut self) -> (u32, u32) {
            (1000, 1000)
        }

        fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
            self.calls.lock().unwrap().push(Call::MoveTo(x, y));
            Ok(())
        }

        fn click(&mut self, button: PointerButton) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Click(button));
            Ok(())
        }

        fn click_at(&mut self, x: i32, y: i32) -> Result<()> {
            self.calls.lock().unwrap().push(Call::ClickAt(x, y));
            Ok(())
        }

        fn press(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Press);
            Ok(())
        }

        fn release(&mut self) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Release);
            Ok(())
        }

        fn scroll(&mut self, amount: i32) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Scroll(amount));
            Ok(())
        }
    }

    fn tuning() -> CursorTuning {
        CursorTuning::from_config(&crate::config::AppConfig::default())
    }

    fn engine() -> CursorGestureEngine {
        CursorGestureEngine::new(CursorSettings::default(), tuning(), (1000, 1000))
    }

    #[test]
    fn first_move_lands_on_fingertip() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        let mut lm = pointing_hand();
        lm[INDEX_TIP] = [0.25, 0.75, 0.0];
        engine.move_cursor(&lm, &mut pointer);
        assert_eq!(pointer.calls(), vec![Call::MoveTo(250, 750)]);
    }

    #[test]
    fn dead_zone_swallows_jitter() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        engine.set_last_pos((250, 750));
        let mut lm = pointing_hand();
        // 5px on a 1000px screen is below the 0.02 dead zone.
        lm[INDEX_TIP] = [0.255, 0.75, 0.0];
        engine.move_cursor(&lm, &mut pointer);
        assert!(pointer.calls().is_empty());
    }

    #[test]
    fn movement_is_smoothed_toward_target() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        engine.set_last_pos((0, 0));
        let mut lm = pointing_hand();
        lm[INDEX_TIP] = [0.5, 0.5, 0.0];
        engine.move_cursor(&lm, &mut pointer);
        // smoothing = 0.5 splits the distance to the raw target.
        assert_eq!(pointer.calls(), vec![Call::MoveTo(250, 250)]);
    }

    #[test]
    fn left_click_fires_on_rising_edge_only() {
        let mut engine = engine();
        engine.settings.click_select = ClickSelectMode::Disabled;
        let mut pointer = MockPointer::default();
        let lm = pinch_hand(INDEX_TIP);

        engine.handle_clicks(&lm, &mut pointer);
        engine.handle_clicks(&lm, &mut pointer);
        let clicks: Vec<_> = pointer
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Click(_)))
            .collect();
        assert_eq!(clicks, vec![Call::Click(PointerButton::Left)]);

        // Releasing then pinching again produces a second click.
        engine.handle_clicks(&open_hand(), &mut pointer);
        engine.handle_clicks(&lm, &mut pointer);
        let clicks: Vec<_> = pointer
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Click(_)))
            .collect();
        assert_eq!(clicks.len(), 2);
    }

    #[test]
    fn right_click_uses_middle_pinch() {
        let mut engine = engine();
        engine.settings.click_select = ClickSelectMode::Disabled;
        let mut pointer = MockPointer::default();
        engine.handle_clicks(&pinch_hand(MIDDLE_TIP), &mut pointer);
        assert_eq!(pointer.calls(), vec![Call::Click(PointerButton::Right)]);
    }

    #[test]
    fn drag_toggles_once_per_edge() {
        let mut engine = engine();
        engine.settings.drag = DragTrigger::PinchHold;
        let mut pointer = MockPointer::default();
        let pinched = pinch_hand(INDEX_TIP);

        engine.handle_drag(&pinched, &mut pointer);
        engine.handle_drag(&pinched, &mut pointer);
        engine.handle_drag(&open_hand(), &mut pointer);
        engine.handle_drag(&open_hand(), &mut pointer);
        assert_eq!(pointer.calls(), vec![Call::Press, Call::Release]);
    }

    #[test]
    fn click_to_select_freezes_target_then_confirms() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        engine.set_last_pos((400, 600));

        // Pointing arms the mode and freezes the current position.
        engine.handle_clicks(&pointing_hand(), &mut pointer);
        assert!(engine.select_armed());
        assert!(pointer.calls().is_empty());

        // Pinch confirms at the frozen target, not at the live position.
        engine.set_last_pos((100, 100));
        engine.handle_clicks(&pinch_hand(INDEX_TIP), &mut pointer);
        assert!(!engine.select_armed());
        assert_eq!(pointer.calls(), vec![Call::ClickAt(400, 600)]);

        // Disarmed again: a plain pinch is an ordinary left click.
        engine.handle_clicks(&open_hand(), &mut pointer);
        engine.handle_clicks(&pinch_hand(INDEX_TIP), &mut pointer);
        assert_eq!(
            pointer.calls().last(),
            Some(&Call::Click(PointerButton::Left))
        );
    }

    #[test]
    fn armed_mode_suppresses_plain_left_click() {
        let mut engine = engine();
        engine.settings.click_select = ClickSelectMode::PointThenFist;
        let mut pointer = MockPointer::default();
        engine.set_last_pos((10, 10));

        engine.handle_clicks(&pointing_hand(), &mut pointer);
        assert!(engine.select_armed());

        // A pinch while armed under fist-confirm config is neither a confirm
        // nor an ordinary click.
        engine.handle_clicks(&pinch_hand(INDEX_TIP), &mut pointer);
        assert!(pointer.calls().is_empty());
        assert!(engine.select_armed());
    }

    #[test]
    fn scroll_follows_middle_finger_displacement() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        engine.set_last_pos((500, 500));

        let mut lm = pointing_hand();
        // Two extended fingers activate the default scroll trigger.
        lm[MIDDLE_TIP] = [0.5, 0.2, 0.0];
        lm[10] = [0.5, 0.4, 0.0];
        assert_eq!(geometry::extended_fingers(&lm), 2);

        engine.handle_scroll(&lm, &mut pointer);
        // dy = 0.2 - 0.5 = -0.3, gain 100 -> scroll(+30).
        assert_eq!(pointer.calls(), vec![Call::Scroll(30)]);
    }

    #[test]
    fn scroll_ignores_sub_threshold_displacement() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        engine.set_last_pos((500, 500));

        let mut lm = pointing_hand();
        lm[MIDDLE_TIP] = [0.5, 0.505, 0.0];
        lm[10] = [0.5, 0.6, 0.0];
        engine.handle_scroll(&lm, &mut pointer);
        assert!(pointer.calls().is_empty());
    }

    #[test]
    fn custom_gesture_bypasses_builtins() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        engine.register_custom("snap", CursorAction::RightClick);

        assert!(engine.handle_custom("snap", &mut pointer));
        assert_eq!(pointer.calls(), vec![Call::Click(PointerButton::Right)]);
        assert!(!engine.handle_custom("unknown", &mut pointer));
    }

    #[test]
    fn custom_drag_toggles_state() {
        let mut engine = engine();
        let mut pointer = MockPointer::default();
        engine.register_custom("grab", CursorAction::Drag);

        engine.handle_custom("grab", &mut pointer);
        engine.handle_custom("grab", &mut pointer);
        assert_eq!(pointer.calls(), vec![Call::Press, Call::Release]);
    }

    #[test]
    fn settings_patch_keeps_unset_fields() {
        let mut engine = engine();
        let patch = CursorSettingsPatch {
            drag: Some(DragTrigger::AllFingersPinch),
            ..Default::default()
        };
        let updated = engine.apply_settings(patch);
        assert_eq!(updated.drag, DragTrigger::AllFingersPinch);
        assert_eq!(updated.left_click, LeftClickTrigger::ThumbIndexPinch);
    }
}
