//! Worker settings with TOML-based sections.
//!
//! Settings are organized into logical sections mapping to TOML tables;
//! every field has a serde default so a partial (or absent) settings file
//! is fine. Recognized `MIX_*` environment variables are applied on top
//! of whatever the file said - the environment is how the queue runtime
//! configures workers.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Worker process settings.
    #[serde(default)]
    pub worker: WorkerSettings,

    /// Pipeline behavior settings.
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

/// Path configuration for media input, model caches and job logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Local directory backing the directory media source
    /// (`MIX_MEDIA_DIR`).
    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    /// Model cache root for DSP leaves that need one (`MIX_MODELS_DIR`).
    #[serde(default)]
    pub models_dir: String,

    /// Directory for per-job log files.
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
}

fn default_media_dir() -> String {
    "media".to_string()
}

fn default_logs_dir() -> String {
    ".logs".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            media_dir: default_media_dir(),
            models_dir: String::new(),
            logs_dir: default_logs_dir(),
        }
    }
}

/// Worker process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Concurrent job slots (one job per slot).
    #[serde(default = "default_slots")]
    pub slots: usize,
}

fn default_slots() -> usize {
    1
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            slots: default_slots(),
        }
    }
}

/// Pipeline behavior configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Disable any network fetch inside DSP leaves (`MIX_OFFLINE=1`).
    #[serde(default)]
    pub offline: bool,

    /// Optional path to a contract document overriding the built-in set.
    #[serde(default)]
    pub contracts_path: String,
}

impl Settings {
    /// Load settings from an optional TOML file, then apply the
    /// environment.
    pub fn load(path: Option<&Path>) -> Self {
        let mut settings = match path {
            Some(path) => match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        tracing::warn!("failed to parse settings file {}: {e}", path.display());
                        Settings::default()
                    }
                },
                Err(e) => {
                    tracing::warn!("failed to read settings file {}: {e}", path.display());
                    Settings::default()
                }
            },
            None => Settings::default(),
        };
        settings.apply_env();
        settings
    }

    /// Apply recognized `MIX_*` environment variables.
    ///
    /// `MIX_JOB_ID` is deliberately not read here: the worker loop exports
    /// it per job for diagnostic propagation into DSP leaves, it is never
    /// an input.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("MIX_MEDIA_DIR") {
            if !dir.is_empty() {
                self.paths.media_dir = dir;
            }
        }
        if let Ok(dir) = std::env::var("MIX_MODELS_DIR") {
            if !dir.is_empty() {
                self.paths.models_dir = dir;
            }
        }
        if let Ok(value) = std::env::var("MIX_OFFLINE") {
            self.pipeline.offline = value == "1";
        }
    }
}
