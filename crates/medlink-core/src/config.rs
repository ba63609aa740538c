//! Orchestrator configuration: TOML file plus `MEDLINK_*` environment
//! overrides.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::drugs::MarginPolicy;
use crate::models::DEFAULT_HISTORY_LIMIT;
use crate::ratelimit::DEFAULT_WINDOW;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value:?}")]
    InvalidOverride { key: &'static str, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn mask(key: &Option<String>) -> &'static str {
    match key {
        Some(k) if !k.is_empty() => "***",
        _ => "<unset>",
    }
}

/// OpenAI-compatible completion and transcription backend.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub transcription_model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: None,
            model: "llama-3.3-70b-versatile".to_string(),
            transcription_model: "whisper-large-v3".to_string(),
        }
    }
}

impl fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(&self.api_key))
            .field("model", &self.model)
            .field("transcription_model", &self.transcription_model)
            .finish()
    }
}

/// Vision-capable model backend.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &mask(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

/// Public nomenclature services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub enabled: bool,
    pub rxnav_url: String,
    pub openfda_url: String,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rxnav_url: "https://rxnav.nlm.nih.gov/REST".to_string(),
            openfda_url: "https://api.fda.gov".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Workflow engine base URL; the workflow tier is skipped when unset.
    pub workflow_url: Option<String>,
    pub completion: CompletionConfig,
    pub vision: VisionConfig,
    pub reference: ReferenceConfig,
    pub request_timeout_secs: u64,
    pub rate_limit_window_ms: u64,
    /// Conversation turns kept on a request.
    pub history_limit: usize,
    /// Trailing turns shown to the tool router.
    pub router_history_window: usize,
    pub margin: MarginPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            workflow_url: None,
            completion: CompletionConfig::default(),
            vision: VisionConfig::default(),
            reference: ReferenceConfig::default(),
            request_timeout_secs: 30,
            rate_limit_window_ms: DEFAULT_WINDOW.as_millis() as u64,
            history_limit: DEFAULT_HISTORY_LIMIT,
            router_history_window: 4,
            margin: MarginPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `MEDLINK_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("MEDLINK_WORKFLOW_URL") {
            self.workflow_url = Some(v);
        }
        if let Some(v) = get("MEDLINK_COMPLETION_URL") {
            self.completion.base_url = v;
        }
        if let Some(v) = get("MEDLINK_COMPLETION_API_KEY") {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = get("MEDLINK_COMPLETION_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = get("MEDLINK_VISION_API_KEY") {
            self.vision.api_key = Some(v);
        }
        if let Some(v) = get("MEDLINK_VISION_MODEL") {
            self.vision.model = v;
        }
        if let Some(v) = get("MEDLINK_RATE_LIMIT_MS") {
            self.rate_limit_window_ms = v.parse().map_err(|_| ConfigError::InvalidOverride {
                key: "MEDLINK_RATE_LIMIT_MS",
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }
}
