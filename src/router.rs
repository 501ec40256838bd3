/// Per-frame operating mode. Modes are mutually exclusive; arbitration runs
/// once per processed frame so asynchronous flag changes take effect on the
/// next frame, never mid-frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Recording,
    CursorControl,
    Predicting,
}

/// Inputs to arbitration, sampled at the start of the frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModeFlags {
    pub hand_present: bool,
    pub recording_active: bool,
    pub cursor_mode: bool,
}

/// Fixed priority: Recording > CursorControl > Predicting. Frames without a
/// detected hand run no mode action at all.
pub fn arbitrate(flags: ModeFlags) -> Mode {
    if !flags.hand_present {
        Mode::Idle
    } else if flags.recording_active {
        Mode::Recording
    } else if flags.cursor_mode {
        Mode::CursorControl
    } else {
        Mode::Predicting
    }
}
