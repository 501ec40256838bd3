use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub socket_path: PathBuf,
    pub target_fps: u64,
    pub worker_threads: usize,
    pub confidence_threshold: f32,
    pub outlier_distance: f32,
    pub cooldown_secs: f64,
    pub buffer_size: usize,
    pub recording_total: u32,
    pub camera_close_timeout_secs: f64,
    pub optimistic_eval: bool,
    pub pinch_threshold: f32,
    pub fist_threshold: f32,
    pub palm_threshold: f32,
    pub all_pinch_threshold: f32,
    pub dead_zone: f32,
    pub smoothing: f32,
    pub scroll_gain: f32,
    pub scroll_dead_zone: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Be resilient in environments without HOME by falling back to CWD.
        let base_dir = dirs::home_dir()
            .or_else(|| std::env::var_os("HOME").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let workspace_dir = base_dir.join(".gesturectl");

        Self {
            data_dir: workspace_dir.join("data"),
            socket_path: workspace_dir.join("gesturectl.sock"),
            target_fps: 25,
            worker_threads: 2,
            confidence_threshold: 0.55,
            outlier_distance: 0.65,
            cooldown_secs: 1.2,
            buffer_size: 6,
            recording_total: 80,
            camera_close_timeout_secs: 2.0,
            optimistic_eval: true,
            pinch_threshold: 0.05,
            fist_threshold: 0.15,
            palm_threshold: 0.2,
            all_pinch_threshold: 0.12,
            dead_zone: 0.02,
            smoothing: 0.5,
            scroll_gain: 100.0,
            scroll_dead_zone: 0.01,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();
        let config_path = defaults
            .data_dir
            .parent()
            .map(|p| p.join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"));

        let builder = Config::builder()
            // Avoid panics on non-UTF8 paths by using lossy conversion.
            .set_default("data_dir", defaults.data_dir.to_string_lossy().as_ref())?
            .set_default(
                "socket_path",
                defaults.socket_path.to_string_lossy().as_ref(),
            )?
            .set_default("target_fps", defaults.target_fps as i64)?
            .set_default("worker_threads", defaults.worker_threads as i64)?
            .set_default("confidence_threshold", defaults.confidence_threshold as f64)?
            .set_default("outlier_distance", defaults.outlier_distance as f64)?
            .set_default("cooldown_secs", defaults.cooldown_secs)?
            .set_default("buffer_size", defaults.buffer_size as i64)?
            .set_default("recording_total", defaults.recording_total as i64)?
            .set_default(
                "camera_close_timeout_secs",
                defaults.camera_close_timeout_secs,
            )?
            .set_default("optimistic_eval", defaults.optimistic_eval)?
            .set_default("pinch_threshold", defaults.pinch_threshold as f64)?
            .set_default("fist_threshold", defaults.fist_threshold as f64)?
            .set_default("palm_threshold", defaults.palm_threshold as f64)?
            .set_default("all_pinch_threshold", defaults.all_pinch_threshold as f64)?
            .set_default("dead_zone", defaults.dead_zone as f64)?
            .set_default("smoothing", defaults.smoothing as f64)?
            .set_default("scroll_gain", defaults.scroll_gain as f64)?
            .set_default("scroll_dead_zone", defaults.scroll_dead_zone as f64)?
            .add_source(File::from(config_path).required(false))
            .add_source(Environment::with_prefix("GESTURECTL"));

        let config = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}
