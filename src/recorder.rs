use std::time::{SystemTime, UNIX_EPOCH};

use crate::storage::Storage;

/// Captures a bounded run of feature vectors into a gesture's sample bucket.
/// The session deactivates itself once the target count is reached.
pub struct SampleRecorder {
    active: bool,
    gesture_id: Option<String>,
    recorded: u32,
    total: u32,
    seq: u64,
}

impl SampleRecorder {
    pub fn new() -> Self {
        Self {
            active: false,
            gesture_id: None,
            recorded: 0,
            total: 0,
            seq: 0,
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    pub fn recorded(&self) -> u32 {
        self.recorded
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn gesture_id(&self) -> Option<&str> {
        self.gesture_id.as_deref()
    }

    /// Resets the session and makes sure the sample bucket exists.
    pub fn start(&mut self, storage: &Storage, gesture_id: &str, total: u32) -> anyhow::Result<()> {
        storage.ensure_bucket(gesture_id)?;
        self.gesture_id = Some(gesture_id.to_string());
        self.total = total;
        self.recorded = 0;
        self.active = true;
        log::info!("recording started for gesture '{gesture_id}' ({total} samples)");
        Ok(())
    }

    /// Persists one sample. Returns whether the session is still active;
    /// calling while inactive is a no-op returning false.
    pub fn save(&mut self, storage: &Storage, vector: &[f32]) -> bool {
        if !self.active {
            return false;
        }
        let Some(gesture_id) = self.gesture_id.clone() else {
            return false;
        };

        let token = self.next_token();
        if let Err(err) = storage.save_sample(&gesture_id, &token, vector) {
            log::warn!("failed to persist sample for '{gesture_id}': {err:?}");
            return self.active;
        }

        self.recorded += 1;
        if self.recorded >= self.total {
            self.active = false;
            log::info!(
                "recording complete for '{gesture_id}' ({} samples)",
                self.recorded
            );
        }
        self.active
    }

    /// Forces the session inactive without discarding saved samples.
    pub fn stop(&mut self) {
        self.active = false;
        log::info!("recording stopped ({} samples saved)", self.recorded);
    }

    /// Millisecond timestamp plus a session-monotonic sequence number, so
    /// rapid saves never collide on a filename.
    fn next_token(&mut self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let token = format!("sample_{millis}_{}", self.seq);
        self.seq += 1;
        token
    }
}

impl Default for SampleRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn session_completes_at_target() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let mut recorder = SampleRecorder::new();
        recorder.start(&storage, "g1", 80).unwrap();

        let vector = vec![0.0f32; 63];
        for i in 0..80 {
            let still_active = recorder.save(&storage, &vector);
            assert_eq!(still_active, i < 79, "unexpected state at sample {i}");
        }
        assert!(!recorder.active());
        assert_eq!(recorder.recorded(), 80);
        assert_eq!(storage.count_samples("g1"), 80);

        // The 81st call is a no-op.
        assert!(!recorder.save(&storage, &vector));
        assert_eq!(recorder.recorded(), 80);
        assert_eq!(storage.count_samples("g1"), 80);
    }

    #[test]
    fn stop_keeps_saved_samples() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let mut recorder = SampleRecorder::new();
        recorder.start(&storage, "g1", 10).unwrap();

        let vector = vec![0.5f32; 63];
        for _ in 0..3 {
            assert!(recorder.save(&storage, &vector));
        }
        recorder.stop();
        assert!(!recorder.active());
        assert_eq!(recorder.recorded(), 3);
        assert_eq!(storage.count_samples("g1"), 3);
    }

    #[test]
    fn rapid_saves_use_distinct_names() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let mut recorder = SampleRecorder::new();
        recorder.start(&storage, "g1", 20).unwrap();

        let vector = vec![1.0f32; 63];
        for _ in 0..20 {
            recorder.save(&storage, &vector);
        }
        assert_eq!(storage.count_samples("g1"), 20);
    }

    #[test]
    fn restart_resets_progress() {
        let dir = tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let mut recorder = SampleRecorder::new();
        recorder.start(&storage, "g1", 5).unwrap();
        recorder.save(&storage, &[0.0; 63]);
        recorder.start(&storage, "g2", 7).unwrap();
        assert_eq!(recorder.recorded(), 0);
        assert_eq!(recorder.total(), 7);
        assert_eq!(recorder.gesture_id(), Some("g2"));
    }
}
