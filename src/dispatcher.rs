use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::actions::{Action, ActionRegistry};

/// Minimum history length before any fire decision is taken.
const MIN_HISTORY: usize = 3;
/// Share of the history the dominant label must hold.
const MAJORITY_RATIO: f32 = 0.7;

/// Majority-vote debounce plus per-action cooldown. Turns noisy per-frame
/// predictions into at most one fired action per cooldown window.
pub struct ActionDispatcher {
    history: VecDeque<String>,
    capacity: usize,
    cooldowns: HashMap<Action, Instant>,
    cooldown: Duration,
    enabled: bool,
}

impl ActionDispatcher {
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            cooldowns: HashMap::new(),
            cooldown,
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Live capacity change: the existing history is re-wrapped, keeping as
    /// many of the most recent entries as fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        while self.history.len() > capacity {
            self.history.pop_front();
        }
        self.capacity = capacity;
    }

    pub fn feed(
        &mut self,
        label: &str,
        action: Action,
        registry: &mut ActionRegistry,
    ) -> Option<Action> {
        self.feed_at(label, action, registry, Instant::now())
    }

    /// Feeds one prediction. Returns the action if it fired.
    pub fn feed_at(
        &mut self,
        label: &str,
        action: Action,
        registry: &mut ActionRegistry,
        now: Instant,
    ) -> Option<Action> {
        if !self.enabled {
            return None;
        }

        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(label.to_string());

        if self.history.len() < MIN_HISTORY {
            return None;
        }

        let (dominant, count) = most_frequent(&self.history)?;
        if dominant != label || (count as f32) < self.history.len() as f32 * MAJORITY_RATIO {
            return None;
        }

        if let Some(last) = self.cooldowns.get(&action) {
            if now.duration_since(*last) < self.cooldown {
                return None;
            }
        }

        match registry.fire(action) {
            Ok(true) => {
                self.cooldowns.insert(action, now);
                log::info!("action fired: {action:?} (gesture: {label})");
                Some(action)
            }
            Ok(false) => None,
            Err(err) => {
                log::error!("action {action:?} failed: {err:?}");
                None
            }
        }
    }
}

fn most_frequent(history: &VecDeque<String>) -> Option<(&str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in history {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    counts.into_iter().max_by_key(|(_, count)| *count)
}
