use crate::controller::PollPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{env, fs, io, path::PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

pub const API_KEY_VAR: &str = "GESTURE_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to encode config: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// URL of the remote gesture classifier.
    pub endpoint: String,
    /// Bearer token; `GESTURE_API_KEY` wins when set.
    pub api_key: Option<String>,
    pub camera_index: u32,
    pub camera_width: u32,
    pub camera_height: u32,
    pub sample_width: u32,
    pub sample_height: u32,
    pub jpeg_quality: u8,
    pub success_delay_ms: u64,
    pub backoff_delay_ms: u64,
    pub idle_delay_ms: u64,
    /// `0` disables the timeout.
    pub request_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/classify".to_string(),
            api_key: None,
            camera_index: 0,
            camera_width: 320,
            camera_height: 240,
            sample_width: 240,
            sample_height: 180,
            jpeg_quality: 60,
            success_delay_ms: 1500,
            backoff_delay_ms: 5000,
            idle_delay_ms: 2000,
            request_timeout_ms: 15_000,
        }
    }
}

impl Config {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            success: Duration::from_millis(self.success_delay_ms),
            backoff: Duration::from_millis(self.backoff_delay_ms),
            idle: Duration::from_millis(self.idle_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    /// Copy safe to print: the stored API key is masked.
    pub fn redacted(&self) -> Config {
        Config {
            api_key: self.api_key.as_ref().map(|_| "********".to_string()),
            ..self.clone()
        }
    }

    pub fn api_key(&self) -> Option<String> {
        env::var(API_KEY_VAR)
            .ok()
            .filter(|k| !k.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

pub fn config_path() -> PathBuf {
    env::var_os("GESTURE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("gesture.json"))
}

pub fn load_config() -> Config {
    let path = config_path();
    let Ok(data) = fs::read(&path) else {
        debug!(path = %path.display(), "no config file, using defaults");
        return Config::default();
    };
    match serde_json::from_slice(&data) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), "ignoring malformed config: {e}");
            Config::default()
        }
    }
}

pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let data = serde_json::to_vec_pretty(cfg)?;
    fs::write(&path, data).map_err(|source| ConfigError::Write { path, source })
}

/// Poll delays from the stored configuration.
pub fn current_policy() -> PollPolicy {
    load_config().poll_policy()
}
