//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The API key is only read from OCR_CHAT_API_KEY, never from the TOML, so
//! it cannot end up in a checked-in config file.

use common::Secret;
use crop::CropConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file used when neither `--config` nor CONFIG_PATH is given.
pub const DEFAULT_CONFIG_FILE: &str = "ocr-chat.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub crop: CropConfig,
    pub ocr: OcrConfig,
    /// Seeds the key pool when it is empty
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,
}

/// Chat API settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Overrides the catalog's first selected model for `ask`
    pub default_model: Option<String>,
    /// Keys tried per request before giving up
    pub max_attempts: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: chat::client::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            default_model: None,
            max_attempts: 3,
        }
    }
}

/// Where the key pool, model selection and conversation are persisted
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub keys_path: PathBuf,
    pub models_path: PathBuf,
    pub conversation_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            keys_path: PathBuf::from("ocr-chat-keys.json"),
            models_path: PathBuf::from("ocr-chat-models.json"),
            conversation_path: PathBuf::from("ocr-chat-conversation.json"),
        }
    }
}

/// External OCR command. `{image}` in `args` is replaced by the image path;
/// without a placeholder the path is appended.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub command: String,
    pub args: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: "tesseract".to_string(),
            args: vec!["{image}".to_string(), "stdout".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.finish()
    }

    /// Like `load`, but a missing file means built-in defaults.
    pub fn load_or_default(path: &Path) -> common::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Config::default().finish()
        }
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    fn finish(mut self) -> common::Result<Self> {
        if let Ok(key) = std::env::var("OCR_CHAT_API_KEY") {
            let key = key.trim().to_owned();
            if !key.is_empty() {
                self.api_key = Some(Secret::new(key));
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://") {
            return Err(common::Error::invalid(
                "api.base_url",
                format!("must start with http:// or https://, got: {}", self.api.base_url),
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(common::Error::invalid(
                "api.timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.api.max_attempts == 0 {
            return Err(common::Error::invalid(
                "api.max_attempts",
                "must be greater than 0",
            ));
        }
        if !(self.crop.handle_size > 0.0) {
            return Err(common::Error::invalid(
                "crop.handle_size",
                "must be greater than 0",
            ));
        }
        if !(self.crop.touch_slop >= 0.0) {
            return Err(common::Error::invalid(
                "crop.touch_slop",
                "must not be negative",
            ));
        }
        if !(self.crop.min_initial_size >= self.crop.handle_size) {
            return Err(common::Error::invalid(
                "crop.min_initial_size",
                "must be at least crop.handle_size",
            ));
        }
        if !(self.crop.initial_fraction > 0.0 && self.crop.initial_fraction <= 1.0) {
            return Err(common::Error::invalid(
                "crop.initial_fraction",
                "must be in (0, 1]",
            ));
        }
        if self.ocr.command.trim().is_empty() {
            return Err(common::Error::Config("ocr.command must not be empty".into()));
        }
        Ok(())
    }
}
