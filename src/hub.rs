use crossbeam_channel::{Sender, TrySendError};

use crate::protocol::Event;

pub type ObserverId = u64;

struct Observer {
    id: ObserverId,
    tx: Sender<String>,
}

/// Fans serialized events out to every connected observer. A dead channel is
/// dropped after the delivery pass so one failing connection never blocks or
/// starves the others; a merely congested channel skips the message but
/// stays connected.
pub struct BroadcastHub {
    observers: Vec<Observer>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn attach(&mut self, id: ObserverId, tx: Sender<String>) {
        self.observers.push(Observer { id, tx });
        log::info!("observer {id} connected ({} total)", self.observers.len());
    }

    pub fn detach(&mut self, id: ObserverId) {
        self.observers.retain(|obs| obs.id != id);
        log::info!(
            "observer {id} disconnected ({} remaining)",
            self.observers.len()
        );
    }

    /// Serializes once and delivers to all observers.
    pub fn broadcast(&mut self, event: &Event) {
        if self.observers.is_empty() {
            return;
        }
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("failed to serialize event: {err}");
                return;
            }
        };

        let mut dead = Vec::new();
        for obs in &self.observers {
            match obs.tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    log::debug!("observer {} is congested, skipping message", obs.id);
                }
                Err(TrySendError::Disconnected(_)) => dead.push(obs.id),
            }
        }
        for id in dead {
            self.detach(id);
        }
    }

    /// Direct reply to a single observer.
    pub fn send_to(&mut self, id: ObserverId, event: &Event) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                log::error!("failed to serialize event: {err}");
                return;
            }
        };
        let Some(obs) = self.observers.iter().find(|obs| obs.id == id) else {
            return;
        };
        if let Err(TrySendError::Disconnected(_)) = obs.tx.try_send(payload) {
            self.detach(id);
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
