use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

use crate::consts::{DEFAULT_INFERENCE_URL, DEFAULT_MODEL_PATH};

/// Process configuration, read from the environment with fixed fallbacks.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Directory holding the model weights (`MODEL_PATH`).
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    /// Base URL of the inference runtime (`INFERENCE_URL`).
    #[serde(default = "default_inference_url")]
    pub inference_url: String,
    /// Where encoded videos land before upload (`SCRATCH_DIR`).
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Service listen port (`PORT`).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_PATH)
}

fn default_inference_url() -> String {
    DEFAULT_INFERENCE_URL.to_string()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_port() -> u16 {
    8000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            inference_url: default_inference_url(),
            scratch_dir: default_scratch_dir(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let conf = Config::builder()
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        Ok(conf.try_deserialize()?)
    }
}
