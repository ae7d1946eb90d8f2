use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_API_VERSION, DEFAULT_CONTEXT_MAX_BYTES_PER_FILE, DEFAULT_CONTEXT_MAX_FILES,
    DEFAULT_DEPLOYMENT, DEFAULT_HISTORY_FILE_NAME, DEFAULT_INITIAL_BACKOFF_MS,
    DEFAULT_MAX_HISTORY, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE,
    MAX_BACKOFF_MS, MAX_TEMPERATURE,
};
use crate::context::LoaderConfig;
use crate::models::RetryPolicy;
use crate::utils::AzccError;

/// Environment variables understood by azcc and the config key each sets
pub const ENV_KEYS: &[(&str, &str)] = &[
    ("AZURE_OPENAI_API_KEY", "azure.api_key"),
    ("AZURE_OPENAI_ENDPOINT", "azure.endpoint"),
    ("AZURE_OPENAI_DEPLOYMENT_NAME", "azure.deployment"),
    ("AZURE_OPENAI_API_VERSION", "azure.api_version"),
    ("AZCC_HISTORY_FILE", "history.file"),
    ("AZCC_MAX_HISTORY", "history.max_turns"),
    ("AZCC_TEMPERATURE", "model.temperature"),
    ("AZCC_TIMEOUT_SECS", "request.timeout_secs"),
    ("AZCC_MAX_RETRIES", "request.max_retries"),
];

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Azure OpenAI connection settings
    #[serde(default)]
    pub azure: AzureConfig,

    /// Persisted conversation history
    #[serde(default)]
    pub history: HistoryConfig,

    /// Generation parameters
    #[serde(default)]
    pub model: ModelSettings,

    /// Deadlines and retries for backend calls
    #[serde(default)]
    pub request: RequestConfig,

    /// Context loader configuration
    #[serde(default)]
    pub context: ContextConfig,

    /// Terminal output
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Resource endpoint, e.g. https://my-resource.openai.azure.com
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Deployment name of the chat model
    pub deployment: String,
    pub api_version: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: None,
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// History file (JSON Lines)
    pub file: PathBuf,
    /// Maximum number of turns retained
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        let file = BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(DEFAULT_HISTORY_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HISTORY_FILE_NAME));
        Self {
            file,
            max_turns: DEFAULT_MAX_HISTORY,
        }
    }
}

/// Default model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Replaces the built-in system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Per-attempt deadline
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
    /// First backoff delay; doubles on every retry
    pub initial_backoff_ms: u64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
        }
    }
}

impl RequestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

/// Context loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum number of files to include
    pub max_files: usize,
    /// Longer files are truncated to this many bytes
    pub max_bytes_per_file: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_CONTEXT_MAX_FILES,
            max_bytes_per_file: DEFAULT_CONTEXT_MAX_BYTES_PER_FILE,
        }
    }
}

impl ContextConfig {
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_files: self.max_files,
            max_bytes_per_file: self.max_bytes_per_file,
            ..LoaderConfig::default()
        }
    }
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Print response text as it arrives
    pub stream: bool,
    /// Render non-streamed responses as styled markdown
    pub render_markdown: bool,
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            stream: true,
            render_markdown: true,
        }
    }
}

impl Config {
    /// Reject values no component can work with
    pub fn validate(&self) -> std::result::Result<(), AzccError> {
        let temperature = self.model.temperature;
        if !(0.0..=MAX_TEMPERATURE).contains(&temperature) {
            return Err(AzccError::Config(format!(
                "temperature must be between 0 and {}, got {}",
                MAX_TEMPERATURE, temperature
            )));
        }
        if self.history.max_turns == 0 {
            return Err(AzccError::Config(
                "history.max_turns must be at least 1".to_string(),
            ));
        }
        if self.request.timeout_secs == 0 {
            return Err(AzccError::Config(
                "request.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from the global and project config files plus the
/// environment
pub fn load_config() -> Result<Config> {
    load_config_from(None)
}

/// Load configuration, replacing the config files with `explicit` when given
pub fn load_config_from(explicit: Option<&Path>) -> Result<Config> {
    let files = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(AzccError::path(path, "config file not found").into());
            }
            vec![path.to_path_buf()]
        }
        None => default_config_files(),
    };

    let config: Config = figment_for(&files)
        .extract()
        .map_err(|e| AzccError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Defaults, then each existing file in order, then the environment
fn figment_for(files: &[PathBuf]) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    for file in files {
        if file.exists() {
            figment = figment.merge(Toml::file(file));
        }
    }

    figment.merge(env_provider())
}

fn env_provider() -> Env {
    Env::raw().filter_map(|key| env_key_path(key.as_str()).map(Into::into))
}

fn env_key_path(key: &str) -> Option<&'static str> {
    ENV_KEYS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, path)| *path)
}

fn default_config_files() -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(proj_dirs) = ProjectDirs::from("", "", "azcc") {
        files.push(proj_dirs.config_dir().join("config.toml"));
    }
    files.push(PathBuf::from(".azcc/config.toml"));
    files
}

/// Get the configuration directory, creating it if needed
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "azcc") {
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;
        Ok(config_dir.to_path_buf())
    } else {
        let home = BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .context("Could not determine home directory")?;
        let config_dir = home.join(".config").join("azcc");
        std::fs::create_dir_all(&config_dir)?;
        Ok(config_dir)
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p,
        None => get_config_dir()?.join("config.toml"),
    };

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(path)
}

/// Create a default configuration file if it doesn't exist. Returns the
/// path when a file was written.
pub fn init_config() -> Result<Option<PathBuf>> {
    let config_file = get_config_dir()?.join("config.toml");
    if config_file.exists() {
        return Ok(None);
    }
    save_config(&Config::default(), Some(config_file)).map(Some)
}
