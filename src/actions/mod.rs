#[cfg(feature = "input-enigo")]
mod enigo;

#[cfg(feature = "input-enigo")]
pub use self::enigo::{EnigoActions, EnigoPointer};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every desktop action a gesture can be bound to. `CursorAction` is the
/// sentinel routing a gesture into the cursor engine; `None` disables
/// dispatch for the gesture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AltTab,
    SwitchWindow,
    NextTab,
    PrevTab,
    GoBack,
    GoForward,
    CloseTab,
    NewTab,
    PlayPause,
    MediaNext,
    MediaPrev,
    VolumeUp,
    VolumeDown,
    Mute,
    Screenshot,
    LockScreen,
    ShowDesktop,
    TaskView,
    MinimizeAll,
    ScrollUp,
    ScrollDown,
    Enter,
    Escape,
    Undo,
    Redo,
    Copy,
    Paste,
    CursorAction,
    None,
}

impl Action {
    pub const ALL: [Action; 29] = [
        Action::AltTab,
        Action::SwitchWindow,
        Action::NextTab,
        Action::PrevTab,
        Action::GoBack,
        Action::GoForward,
        Action::CloseTab,
        Action::NewTab,
        Action::PlayPause,
        Action::MediaNext,
        Action::MediaPrev,
        Action::VolumeUp,
        Action::VolumeDown,
        Action::Mute,
        Action::Screenshot,
        Action::LockScreen,
        Action::ShowDesktop,
        Action::TaskView,
        Action::MinimizeAll,
        Action::ScrollUp,
        Action::ScrollDown,
        Action::Enter,
        Action::Escape,
        Action::Undo,
        Action::Redo,
        Action::Copy,
        Action::Paste,
        Action::CursorAction,
        Action::None,
    ];
}

/// Keys the action table can press. Backends map these onto whatever the
/// underlying automation library understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HotKey {
    Alt,
    Ctrl,
    Shift,
    Meta,
    Tab,
    Left,
    Right,
    Enter,
    Escape,
    Char(char),
    PlayPause,
    MediaNext,
    MediaPrev,
    VolumeUp,
    VolumeDown,
    Mute,
}

/// What firing an action actually does.
#[derive(Clone, Copy, Debug)]
pub enum ActionSpec {
    Hotkey(&'static [HotKey]),
    Scroll(i32),
    /// Sentinel entries that never produce a side effect.
    Noop,
}

/// Injected keystroke/scroll capability. Implementations must not panic;
/// failures are reported and swallowed by the dispatcher.
pub trait ActionBackend: Send {
    fn hotkey(&mut self, chord: &[HotKey]) -> Result<()>;
    fn scroll(&mut self, amount: i32) -> Result<()>;
}

/// Backend that only logs. Used when no automation feature is compiled in.
pub struct NoopActions;

impl ActionBackend for NoopActions {
    fn hotkey(&mut self, chord: &[HotKey]) -> Result<()> {
        log::debug!("noop backend: hotkey {chord:?}");
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        log::debug!("noop backend: scroll {amount}");
        Ok(())
    }
}

fn builtin_table() -> HashMap<Action, ActionSpec> {
    use HotKey::{Alt, Char, Ctrl, Enter, Escape, Left, Meta, Right, Shift, Tab};

    let entries: [(Action, ActionSpec); 29] = [
        (Action::AltTab, ActionSpec::Hotkey(&[Alt, Tab])),
        (Action::SwitchWindow, ActionSpec::Hotkey(&[Alt, Tab])),
        (Action::NextTab, ActionSpec::Hotkey(&[Ctrl, Tab])),
        (Action::PrevTab, ActionSpec::Hotkey(&[Ctrl, Shift, Tab])),
        (Action::GoBack, ActionSpec::Hotkey(&[Alt, Left])),
        (Action::GoForward, ActionSpec::Hotkey(&[Alt, Right])),
        (Action::CloseTab, ActionSpec::Hotkey(&[Ctrl, Char('w')])),
        (Action::NewTab, ActionSpec::Hotkey(&[Ctrl, Char('t')])),
        (Action::PlayPause, ActionSpec::Hotkey(&[HotKey::PlayPause])),
        (Action::MediaNext, ActionSpec::Hotkey(&[HotKey::MediaNext])),
        (Action::MediaPrev, ActionSpec::Hotkey(&[HotKey::MediaPrev])),
        (Action::VolumeUp, ActionSpec::Hotkey(&[HotKey::VolumeUp])),
        (Action::VolumeDown, ActionSpec::Hotkey(&[HotKey::VolumeDown])),
        (Action::Mute, ActionSpec::Hotkey(&[HotKey::Mute])),
        (Action::Screenshot, ActionSpec::Hotkey(&[Meta, Shift, Char('s')])),
        (Action::LockScreen, ActionSpec::Hotkey(&[Meta, Char('l')])),
        (Action::ShowDesktop, ActionSpec::Hotkey(&[Meta, Char('d')])),
        (Action::TaskView, ActionSpec::Hotkey(&[Meta, Tab])),
        (Action::MinimizeAll, ActionSpec::Hotkey(&[Meta, Char('m')])),
        (Action::ScrollUp, ActionSpec::Scroll(5)),
        (Action::ScrollDown, ActionSpec::Scroll(-5)),
        (Action::Enter, ActionSpec::Hotkey(&[Enter])),
        (Action::Escape, ActionSpec::Hotkey(&[Escape])),
        (Action::Undo, ActionSpec::Hotkey(&[Ctrl, Char('z')])),
        (Action::Redo, ActionSpec::Hotkey(&[Ctrl, Char('y')])),
        (Action::Copy, ActionSpec::Hotkey(&[Ctrl, Char('c')])),
        (Action::Paste, ActionSpec::Hotkey(&[Ctrl, Char('v')])),
        (Action::CursorAction, ActionSpec::Noop),
        (Action::None, ActionSpec::Noop),
    ];
    entries.into_iter().collect()
}

/// Maps every `Action` to its executable spec. Built once at startup so an
/// unbound action is impossible by construction.
pub struct ActionRegistry {
    table: HashMap<Action, ActionSpec>,
    backend: Box<dyn ActionBackend>,
}

impl ActionRegistry {
    pub fn new(backend: Box<dyn ActionBackend>) -> Self {
        Self {
            table: builtin_table(),
            backend,
        }
    }

    /// Executes `action`. Returns `Ok(true)` when a side effect ran,
    /// `Ok(false)` for sentinel entries.
    pub fn fire(&mut self, action: Action) -> Result<bool> {
        match self.table[&action] {
            ActionSpec::Hotkey(chord) => {
                self.backend.hotkey(chord)?;
                Ok(true)
            }
            ActionSpec::Scroll(amount) => {
                self.backend.scroll(amount)?;
                Ok(true)
            }
            ActionSpec::Noop => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        chords: Arc<Mutex<Vec<Vec<HotKey>>>>,
        scrolls: Arc<Mutex<Vec<i32>>>,
    }

    impl ActionBackend for Recorder {
        fn hotkey(&mut self, chord: &[HotKey]) -> Result<()> {
            self.chords.lock().unwrap().push(chord.to_vec());
            Ok(())
        }

        fn scroll(&mut self, amount: i32) -> Result<()> {
            self.scrolls.lock().unwrap().push(amount);
            Ok(())
        }
    }

    #[test]
    fn every_action_has_a_spec() {
        let table = builtin_table();
        for action in Action::ALL {
            assert!(table.contains_key(&action), "missing spec for {action:?}");
        }
    }

    #[test]
    fn sentinels_do_not_fire() {
        let mut registry = ActionRegistry::new(Box::new(Recorder::default()));
        assert!(!registry.fire(Action::None).unwrap());
        assert!(!registry.fire(Action::CursorAction).unwrap());
    }

    #[test]
    fn hotkey_actions_reach_the_backend() {
        let recorder = Recorder::default();
        let chords = recorder.chords.clone();
        let scrolls = recorder.scrolls.clone();
        let mut registry = ActionRegistry::new(Box::new(recorder));

        assert!(registry.fire(Action::AltTab).unwrap());
        assert!(registry.fire(Action::ScrollUp).unwrap());
        assert_eq!(chords.lock().unwrap()[0], vec![HotKey::Alt, HotKey::Tab]);
        assert_eq!(scrolls.lock().unwrap()[0], 5);
    }

    #[test]
    fn action_labels_match_wire_names() {
        assert_eq!(
            serde_json::to_string(&Action::AltTab).unwrap(),
            "\"alt_tab\""
        );
        assert_eq!(serde_json::to_string(&Action::None).unwrap(), "\"none\"");
        assert_eq!(
            serde_json::from_str::<Action>("\"cursor_action\"").unwrap(),
            Action::CursorAction
        );
    }
}
