use crate::alignment::DEFAULT_REVIEW_THRESHOLD;
use crate::error::{CoreError, Result};
use crate::lrc::DEFAULT_ATTRIBUTION;
use crate::sync::{SessionSettings, DEFAULT_MAX_AUDIO_BYTES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable consulted when `gemini.api_key` is empty
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyricSyncConfig {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

const fn default_timeout_secs() -> u64 {
    120
}

const fn default_max_retries() -> u32 {
    2
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl GeminiConfig {
    /// The configured API key, or the `GEMINI_API_KEY` environment variable
    /// when the config leaves it empty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigMissingField`] if neither is set.
    pub fn resolved_api_key(&self) -> Result<String> {
        if !self.api_key.trim().is_empty() {
            return Ok(self.api_key.trim().to_string());
        }
        std::env::var(GEMINI_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CoreError::ConfigMissingField {
                field: "gemini.api_key".to_string(),
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlignmentConfig {
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
    #[serde(default = "default_max_audio_bytes")]
    pub max_audio_bytes: u64,
}

const fn default_review_threshold() -> f64 {
    DEFAULT_REVIEW_THRESHOLD
}

const fn default_max_audio_bytes() -> u64 {
    DEFAULT_MAX_AUDIO_BYTES
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            review_threshold: default_review_threshold(),
            max_audio_bytes: default_max_audio_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_attribution")]
    pub attribution: String,
}

fn default_attribution() -> String {
    DEFAULT_ATTRIBUTION.to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            attribution: default_attribution(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to the cache directory
    #[serde(default)]
    pub enabled: bool,
}

impl LyricSyncConfig {
    /// Get the config file path (~/.config/lyricsync/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default location, writing a template on first run
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConfigNotFound`] after creating the template, or
    /// an error if the file cannot be read, parsed or validated.
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&config_path, CONFIG_TEMPLATE)?;
            return Err(CoreError::ConfigNotFound { path: config_path });
        }

        Self::load_from(&config_path)
    }

    /// Load config from a specific file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate config text
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or a value is out of range.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let threshold = self.alignment.review_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CoreError::ConfigInvalid {
                message: format!("alignment.review_threshold must be within 0..=1, got {threshold}"),
            });
        }
        if self.alignment.max_audio_bytes == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "alignment.max_audio_bytes must be greater than zero".to_string(),
            });
        }
        if self.gemini.model.trim().is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "gemini.model".to_string(),
            });
        }
        Ok(())
    }

    /// Session tunables derived from this config
    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            review_threshold: self.alignment.review_threshold,
            max_audio_bytes: self.alignment.max_audio_bytes,
            attribution: self.export.attribution.clone(),
        }
    }
}

const CONFIG_TEMPLATE: &str = r#"# LyricSync Configuration
# ~/.config/lyricsync/config.toml

[gemini]
# Required for `lyricsync align`. Leave empty to use the GEMINI_API_KEY environment variable.
api_key = ""
model = "gemini-2.5-flash"
timeout_secs = 120
max_retries = 2

[alignment]
# Lines the model is less confident about than this are flagged for review
review_threshold = 0.7
# Audio files larger than this many bytes are rejected before upload (25 MiB)
max_audio_bytes = 26214400

[export]
# Written to the [by:] tag of exported files
attribution = "LyricSync"

[logging]
# Also write logs to the cache directory
enabled = false
"#;
