use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use speakeasy_types::AnalysisMode;

/// Environment variable that overrides the service base URL.
pub const SERVICE_URL_ENV: &str = "SPEAKEASY_SERVICE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Invalid service URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Config directory not found")]
    NoDirFound,
}

/// Which upstream endpoint shape the service exposes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceApi {
    /// `POST /process` with a `file` field.
    #[default]
    Process,
    /// `POST /api/analyze` with a `video` field.
    Analyze,
}

impl ServiceApi {
    pub fn path(self) -> &'static str {
        match self {
            ServiceApi::Process => "/process",
            ServiceApi::Analyze => "/api/analyze",
        }
    }

    /// Multipart field carrying the artifact.
    pub fn file_field(self) -> &'static str {
        match self {
            ServiceApi::Process => "file",
            ServiceApi::Analyze => "video",
        }
    }
}

/// Analysis service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the analysis service.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Endpoint shape.
    #[serde(default)]
    pub api: ServiceApi,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api: ServiceApi::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServiceConfig {
    /// Full URL of the analysis endpoint.
    pub fn analyze_url(&self) -> Result<url::Url, ConfigError> {
        self.join(self.api.path())
    }

    /// Full URL of the health endpoint.
    pub fn health_url(&self) -> Result<url::Url, ConfigError> {
        self.join("/api/health")
    }

    fn join(&self, path: &str) -> Result<url::Url, ConfigError> {
        let invalid = |source| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        };
        let base = url::Url::parse(&self.base_url).map_err(invalid)?;
        base.join(path).map_err(invalid)
    }
}

/// Live capture command settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Program to spawn.
    #[serde(default = "default_capture_program")]
    pub program: String,
    /// Arguments; the program must write the container to stdout.
    #[serde(default = "default_capture_args")]
    pub args: Vec<String>,
    /// MIME type of what the program writes.
    #[serde(default = "default_capture_mime")]
    pub mime_type: String,
}

fn default_capture_program() -> String {
    "ffmpeg".to_string()
}

fn default_capture_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "v4l2",
        "-i",
        "/dev/video0",
        "-f",
        "pulse",
        "-i",
        "default",
        "-c:v",
        "libvpx",
        "-c:a",
        "libopus",
        "-f",
        "webm",
        "-",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_capture_mime() -> String {
    "video/webm".to_string()
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: default_capture_program(),
            args: default_capture_args(),
            mime_type: default_capture_mime(),
        }
    }
}

/// Top-level SpeakEasy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeakEasyConfig {
    /// Analysis service settings.
    #[serde(default)]
    pub service: ServiceConfig,
    /// Default session mode.
    #[serde(default)]
    pub mode: AnalysisMode,
    /// Speech purpose sent when none is given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_purpose: Option<String>,
    /// Live capture settings.
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl SpeakEasyConfig {
    /// Apply a base URL override, e.g. from the environment or a CLI flag.
    pub fn with_base_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.service.base_url = url;
        }
        self
    }
}

/// Resolve the speakeasy config directory (~/.speakeasy/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".speakeasy"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.speakeasy/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
///
/// `SPEAKEASY_SERVICE_URL` (from the process environment or `.env`) wins over
/// the file's `service.base_url`.
pub fn load_config() -> Result<SpeakEasyConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    let config = load_config_from(&path)?;
    Ok(config.with_base_url(std::env::var(SERVICE_URL_ENV).ok()))
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<SpeakEasyConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(SpeakEasyConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: SpeakEasyConfig = json5::from_str(&content)?;
    tracing::debug!(path = %path.display(), base_url = %config.service.base_url, "Config loaded");
    Ok(config)
}
