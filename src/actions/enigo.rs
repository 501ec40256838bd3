use anyhow::{Context, Result};
use enigo::{Axis, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use super::{ActionBackend, HotKey};

/// Keystroke backend driving the OS input stack through enigo.
pub struct EnigoActions {
    enigo: Enigo,
}

impl EnigoActions {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .context("failed to initialize enigo input backend")?;
        Ok(Self { enigo })
    }
}

fn map_key(key: HotKey) -> Key {
    match key {
        HotKey::Alt => Key::Alt,
        HotKey::Ctrl => Key::Control,
        HotKey::Shift => Key::Shift,
        HotKey::Meta => Key::Meta,
        HotKey::Tab => Key::Tab,
        HotKey::Left => Key::LeftArrow,
        HotKey::Right => Key::RightArrow,
        HotKey::Enter => Key::Return,
        HotKey::Escape => Key::Escape,
        HotKey::Char(c) => Key::Unicode(c),
        HotKey::PlayPause => Key::MediaPlayPause,
        HotKey::MediaNext => Key::MediaNextTrack,
        HotKey::MediaPrev => Key::MediaPrevTrack,
        HotKey::VolumeUp => Key::VolumeUp,
        HotKey::VolumeDown => Key::VolumeDown,
        HotKey::Mute => Key::VolumeMute,
    }
}

impl ActionBackend for EnigoActions {
    fn hotkey(&mut self, chord: &[HotKey]) -> Result<()> {
        for key in chord {
            self.enigo.key(map_key(*key), Direction::Press)?;
        }
        for key in chord.iter().rev() {
            self.enigo.key(map_key(*key), Direction::Release)?;
        }
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        // Positive amounts scroll content up, matching the action table.
        self.enigo.scroll(-amount, Axis::Vertical)?;
        Ok(())
    }
}

/// Pointer backend over the same input stack.
pub struct EnigoPointer {
    enigo: Enigo,
}

impl EnigoPointer {
    pub fn new() -> Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .context("failed to initialize enigo pointer backend")?;
        Ok(Self { enigo })
    }
}

impl crate::cursor::PointerBackend for EnigoPointer {
    fn screen_size(&mut self) -> (u32, u32) {
        match self.enigo.main_display() {
            Ok((w, h)) if w > 0 && h > 0 => (w as u32, h as u32),
            _ => {
                log::warn!("could not query display size, assuming 1920x1080");
                (1920, 1080)
            }
        }
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        self.enigo.move_mouse(x, y, enigo::Coordinate::Abs)?;
        Ok(())
    }

    fn click(&mut self, button: crate::cursor::PointerButton) -> Result<()> {
        self.enigo.button(map_button(button), Direction::Click)?;
        Ok(())
    }

    fn click_at(&mut self, x: i32, y: i32) -> Result<()> {
        self.enigo.move_mouse(x, y, enigo::Coordinate::Abs)?;
        self.enigo.button(enigo::Button::Left, Direction::Click)?;
        Ok(())
    }

    fn press(&mut self) -> Result<()> {
        self.enigo.button(enigo::Button::Left, Direction::Press)?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.enigo.button(enigo::Button::Left, Direction::Release)?;
        Ok(())
    }

    fn scroll(&mut self, amount: i32) -> Result<()> {
        self.enigo.scroll(-amount, Axis::Vertical)?;
        Ok(())
    }
}

fn map_button(button: crate::cursor::PointerButton) -> enigo::Button {
    match button {
        crate::cursor::PointerButton::Left => enigo::Button::Left,
        crate::cursor::PointerButton::Right => enigo::Button::Right,
    }
}
