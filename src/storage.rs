use rayon::prelude::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::GestureMap;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

type Result<T> = std::result::Result<T, StorageError>;

/// Opaque load/save layer over the on-disk state: the gesture table, the
/// per-gesture sample buckets, and the trained-model artifact.
#[derive(Clone, Debug)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn gestures_path(&self) -> PathBuf {
        self.data_dir.join("gestures.json")
    }

    fn model_path(&self) -> PathBuf {
        self.data_dir.join("model.json")
    }

    fn model_meta_path(&self) -> PathBuf {
        self.data_dir.join("model_meta.json")
    }

    fn bucket_dir(&self, gesture_id: &str) -> PathBuf {
        self.data_dir.join("gestures").join(gesture_id)
    }

    /// Missing or unreadable table yields an empty mapping.
    pub fn load_gestures(&self) -> GestureMap {
        match load_json(&self.gestures_path()) {
            Ok(Some(map)) => map,
            Ok(None) => GestureMap::new(),
            Err(err) => {
                log::warn!("failed to load gesture table: {err}");
                GestureMap::new()
            }
        }
    }

    pub fn save_gestures(&self, gestures: &GestureMap) -> Result<()> {
        save_json(&self.gestures_path(), gestures)
    }

    pub fn ensure_bucket(&self, gesture_id: &str) -> Result<()> {
        let dir = self.bucket_dir(gesture_id);
        fs::create_dir_all(&dir).map_err(|source| StorageError::Io { path: dir, source })
    }

    pub fn save_sample(&self, gesture_id: &str, token: &str, vector: &[f32]) -> Result<()> {
        let path = self.bucket_dir(gesture_id).join(format!("{token}.json"));
        save_json(&path, &vector)
    }

    /// Loads every parsable sample in a bucket. Malformed files are skipped
    /// silently; missing buckets yield an empty set.
    pub fn load_samples(&self, gesture_id: &str) -> Vec<Vec<f32>> {
        let dir = self.bucket_dir(gesture_id);
        let Ok(entries) = fs::read_dir(&dir) else {
            return Vec::new();
        };
        let files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();

        let mut samples: Vec<(PathBuf, Vec<f32>)> = files
            .par_iter()
            .filter_map(|path| {
                let raw = fs::read_to_string(path).ok()?;
                let vector: Vec<f32> = serde_json::from_str(&raw).ok()?;
                Some((path.clone(), vector))
            })
            .collect();
        // Deterministic load order for reproducible splits.
        samples.sort_by(|a, b| a.0.cmp(&b.0));
        samples.into_iter().map(|(_, v)| v).collect()
    }

    pub fn count_samples(&self, gesture_id: &str) -> usize {
        fs::read_dir(self.bucket_dir(gesture_id))
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "json"))
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn delete_bucket(&self, gesture_id: &str) -> Result<()> {
        let dir = self.bucket_dir(gesture_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(|source| StorageError::Io { path: dir, source })?;
        }
        Ok(())
    }

    pub fn load_model<T: DeserializeOwned>(&self) -> Option<T> {
        match load_json(&self.model_path()) {
            Ok(model) => model,
            Err(err) => {
                log::warn!("failed to load model artifact: {err}");
                None
            }
        }
    }

    pub fn save_model<T: Serialize>(&self, artifact: &T) -> Result<()> {
        save_json(&self.model_path(), artifact)
    }

    /// Gesture metadata snapshot persisted alongside the model artifact.
    pub fn save_model_meta(&self, gestures: &GestureMap) -> Result<()> {
        save_json(&self.model_meta_path(), gestures)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value = serde_json::from_str(&raw).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(value))
}

/// Write-then-rename so readers never observe a partially written file.
fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StorageError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let raw = serde_json::to_string_pretty(value).map_err(|source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, raw).map_err(|source| StorageError::Io {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })
}
