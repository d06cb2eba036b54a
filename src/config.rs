//! Configuration management for reddit-ocr using the prefer crate.
//!
//! Settings are layered: preset defaults, then the config file, then
//! `REDDIT_OCR_*` environment variables, then command-line flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ocr::{create_backend, BackendFactory, OcrBackendType, OcrConfig};
use crate::scrapers::{HttpClient, HttpClientError, DEFAULT_ENDPOINT};
use crate::services::download::DownloadConfig;
use crate::services::pipeline::{PipelineConfig, Schedule};
use crate::utils::TextNormalization;

pub const DEFAULT_SUBREDDIT: &str = "greentext";
pub const DEFAULT_RESOURCES_DIR: &str = "resources";
pub const DEFAULT_OUTPUT_DIR: &str = "greentext_output";
pub const DEFAULT_LANGUAGE: &str = "eng";
/// Default number of days walked back by the `daily` preset.
pub const DEFAULT_DAYS: u32 = 7;

/// Run presets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 10 images, 3 workers, one query.
    #[default]
    Single,
    /// 100 images, 20 workers, one query.
    Batch,
    /// 100 images per day, one worker per CPU, several days back.
    Daily,
}

impl Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Single => "single",
            Preset::Batch => "batch",
            Preset::Daily => "daily",
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            Preset::Single => 10,
            Preset::Batch | Preset::Daily => 100,
        }
    }

    /// Worker count; 0 means one per logical CPU.
    pub fn workers(&self) -> usize {
        match self {
            Preset::Single => 3,
            Preset::Batch => 20,
            Preset::Daily => 0,
        }
    }

    pub fn days(&self) -> u32 {
        match self {
            Preset::Single | Preset::Batch => 1,
            Preset::Daily => DEFAULT_DAYS,
        }
    }

    /// Whether the preset walks back through one-day windows.
    pub fn is_windowed(&self) -> bool {
        matches!(self, Preset::Daily)
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format} config {}: {message}", path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
}

/// Resolved application settings.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub preset: Preset,
    /// Search endpoint.
    pub endpoint: String,
    pub subreddit: String,
    /// Posts requested per query.
    pub size: u32,
    /// OCR workers; 0 means one per logical CPU.
    pub workers: usize,
    /// Cycles for windowed presets.
    pub days: u32,
    /// Hosts images may be downloaded from.
    pub allowed_hosts: Vec<String>,
    /// Directory for downloaded images.
    pub resources_dir: PathBuf,
    /// Directory for recognized text.
    pub output_dir: PathBuf,
    /// Tesseract language code.
    pub language: String,
    /// Tesseract executable, looked up in PATH when not a path.
    pub tesseract_binary: PathBuf,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests to one host in milliseconds.
    pub request_delay_ms: u64,
    /// User agent for HTTP requests (None = built-in agent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Per-image OCR deadline in seconds; 0 disables it.
    pub job_timeout_secs: u64,
    /// Maximum downloads in flight.
    pub download_concurrency: usize,
    pub normalization: TextNormalization,
    /// URL prefix rewrites for caching proxies or mirrors.
    pub via: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::for_preset(Preset::default())
    }
}

impl Settings {
    /// Defaults for a preset.
    pub fn for_preset(preset: Preset) -> Self {
        Self {
            preset,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            subreddit: DEFAULT_SUBREDDIT.to_string(),
            size: preset.size(),
            workers: preset.workers(),
            days: preset.days(),
            allowed_hosts: vec!["i.redd.it".to_string()],
            resources_dir: PathBuf::from(DEFAULT_RESOURCES_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            language: DEFAULT_LANGUAGE.to_string(),
            tesseract_binary: PathBuf::from("tesseract"),
            request_timeout: 30,
            request_delay_ms: 500,
            user_agent: None,
            job_timeout_secs: 120,
            download_concurrency: 8,
            normalization: TextNormalization::default(),
            via: HashMap::new(),
        }
    }

    /// Number of OCR workers to start.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    /// Cycle plan. Windowed presets end their first window at `before`
    /// (default: now).
    pub fn schedule(&self, before: Option<DateTime<Utc>>) -> Schedule {
        if self.preset.is_windowed() {
            Schedule::Daily {
                days: self.days.max(1),
                before: before.unwrap_or_else(Utc::now),
            }
        } else {
            Schedule::Once
        }
    }

    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig {
            resources_dir: self.resources_dir.clone(),
            output_dir: self.output_dir.clone(),
            allowed_hosts: self.allowed_hosts.clone(),
            concurrency: self.download_concurrency.max(1),
        }
    }

    pub fn pipeline_config(&self, before: Option<DateTime<Utc>>) -> PipelineConfig {
        PipelineConfig {
            endpoint: self.endpoint.clone(),
            subreddit: self.subreddit.clone(),
            size: self.size,
            schedule: self.schedule(before),
            workers: self.worker_count(),
            language: self.language.clone(),
            job_timeout: self.job_timeout(),
            normalization: self.normalization,
            download: self.download_config(),
        }
    }

    pub fn ocr_config(&self) -> OcrConfig {
        OcrConfig {
            language: self.language.clone(),
            tesseract_binary: self.tesseract_binary.clone(),
        }
    }

    /// Creates one Tesseract backend per OCR worker.
    pub fn backend_factory(&self) -> BackendFactory {
        let ocr_config = self.ocr_config();
        Arc::new(move || create_backend(OcrBackendType::Tesseract, &ocr_config))
    }

    /// HTTP client shared by the search and the image downloads.
    pub fn http_client(&self) -> Result<HttpClient, HttpClientError> {
        let mut builder = HttpClient::builder(
            "reddit",
            Duration::from_secs(self.request_timeout),
            Duration::from_millis(self.request_delay_ms),
        );
        if let Some(ref ua) = self.user_agent {
            builder = builder.user_agent(ua);
        }
        if !self.via.is_empty() {
            builder = builder.via(self.via.clone());
        }
        builder.build()
    }

    /// Ensure the image and text directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.resources_dir)?;
        std::fs::create_dir_all(&self.output_dir)?;
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,
    /// Image directory, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "resources")]
    pub resources_dir: Option<String>,
    /// Text directory, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "output")]
    pub output_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tesseract_binary: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<TextNormalization>,
    /// URL rewriting for caching proxies.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub via: HashMap<String, String>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover and load a config file with prefer.
    ///
    /// No config file is not an error; a config file that does not parse is.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("reddit-ocr").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            Err(e) => {
                tracing::debug!("No config file discovered: {}", e);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        match ext {
            "json" => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref endpoint) = self.endpoint {
            settings.endpoint = endpoint.clone();
        }
        if let Some(ref subreddit) = self.subreddit {
            settings.subreddit = subreddit.clone();
        }
        if let Some(size) = self.size {
            settings.size = size;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(days) = self.days {
            settings.days = days;
        }
        if let Some(ref hosts) = self.allowed_hosts {
            settings.allowed_hosts = hosts.clone();
        }
        if let Some(ref dir) = self.resources_dir {
            settings.resources_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref dir) = self.output_dir {
            settings.output_dir = self.resolve_path(dir, base_dir);
        }
        if let Some(ref language) = self.language {
            settings.language = language.clone();
        }
        if let Some(ref binary) = self.tesseract_binary {
            // Bare names are looked up in PATH, not next to the config file.
            settings.tesseract_binary = if binary.contains('/') || binary.starts_with('~') {
                self.resolve_path(binary, base_dir)
            } else {
                PathBuf::from(binary)
            };
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(secs) = self.job_timeout_secs {
            settings.job_timeout_secs = secs;
        }
        if let Some(n) = self.download_concurrency {
            settings.download_concurrency = n;
        }
        if let Some(mode) = self.normalization {
            settings.normalization = mode;
        }
        for (from, to) in &self.via {
            settings.via.insert(from.clone(), to.clone());
        }
    }
}

/// Apply `REDDIT_OCR_*` overrides read through `var`.
pub fn apply_env_overrides_from<F>(settings: &mut Settings, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| var(name).filter(|s| !s.is_empty());

    if let Some(endpoint) = get("REDDIT_OCR_ENDPOINT") {
        tracing::debug!("Using REDDIT_OCR_ENDPOINT from environment: {}", endpoint);
        settings.endpoint = endpoint;
    }
    if let Some(subreddit) = get("REDDIT_OCR_SUBREDDIT") {
        settings.subreddit = subreddit;
    }
    if let Some(dir) = get("REDDIT_OCR_RESOURCES_DIR") {
        settings.resources_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
    }
    if let Some(dir) = get("REDDIT_OCR_OUTPUT_DIR") {
        settings.output_dir = PathBuf::from(shellexpand::tilde(&dir).as_ref());
    }
}

/// Apply `REDDIT_OCR_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_env_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Preset chosen on the command line (overrides the config file).
    pub preset: Option<Preset>,
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await?,
    };

    let preset = options.preset.or(config.preset).unwrap_or_default();
    let mut settings = Settings::for_preset(preset);

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);
    apply_env_overrides(&mut settings);

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_defaults() {
        let single = Settings::for_preset(Preset::Single);
        assert_eq!((single.size, single.workers, single.days), (10, 3, 1));

        let batch = Settings::for_preset(Preset::Batch);
        assert_eq!((batch.size, batch.workers), (100, 20));

        let daily = Settings::for_preset(Preset::Daily);
        assert_eq!(daily.size, 100);
        assert_eq!(daily.days, DEFAULT_DAYS);
        assert_eq!(daily.worker_count(), num_cpus::get().max(1));
    }

    #[test]
    fn test_schedule_follows_preset() {
        assert_eq!(Settings::for_preset(Preset::Batch).schedule(None), Schedule::Once);

        let before = Utc::now();
        let mut daily = Settings::for_preset(Preset::Daily);
        daily.days = 3;
        assert_eq!(
            daily.schedule(Some(before)),
            Schedule::Daily { days: 3, before }
        );
    }

    #[test]
    fn test_job_timeout_zero_disables() {
        let mut settings = Settings::default();
        assert_eq!(settings.job_timeout(), Some(Duration::from_secs(120)));
        settings.job_timeout_secs = 0;
        assert_eq!(settings.job_timeout(), None);
    }

    #[test]
    fn test_parse_toml_and_apply() {
        let config = Config::parse(
            Path::new("/etc/reddit-ocr/reddit-ocr.toml"),
            r#"
subreddit = "4chan"
workers = 5
resources_dir = "images"
output_dir = "/var/lib/ocr"
normalization = "all_blank_lines"

[via]
"https://i.redd.it/" = "http://cache.local/"
"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, Path::new("/etc/reddit-ocr"));

        assert_eq!(settings.subreddit, "4chan");
        assert_eq!(settings.workers, 5);
        assert_eq!(settings.size, 10);
        assert_eq!(settings.resources_dir, PathBuf::from("/etc/reddit-ocr/images"));
        assert_eq!(settings.output_dir, PathBuf::from("/var/lib/ocr"));
        assert_eq!(settings.normalization, TextNormalization::AllBlankLines);
        assert_eq!(
            settings.via.get("https://i.redd.it/").map(String::as_str),
            Some("http://cache.local/")
        );
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = Config::parse(Path::new("c.yaml"), "preset: daily\ndays: 3\n").unwrap();
        assert_eq!(yaml.preset, Some(Preset::Daily));
        assert_eq!(yaml.days, Some(3));

        let json = Config::parse(Path::new("c.json"), r#"{"size": 25}"#).unwrap();
        assert_eq!(json.size, Some(25));
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Config::parse(Path::new("c.toml"), "size = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reddit-ocr.toml");
        std::fs::write(&path, "language = \"deu\"\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.language.as_deref(), Some("deu"));
        assert_eq!(config.base_dir(), Some(dir.path().to_path_buf()));

        let missing = Config::load_from_path(&dir.path().join("nope.toml")).await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("REDDIT_OCR_SUBREDDIT", "pics"),
            ("REDDIT_OCR_OUTPUT_DIR", "/tmp/text"),
            ("REDDIT_OCR_ENDPOINT", ""),
        ]);
        let mut settings = Settings::default();
        apply_env_overrides_from(&mut settings, |name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(settings.subreddit, "pics");
        assert_eq!(settings.output_dir, PathBuf::from("/tmp/text"));
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_settings_serialize_as_toml() {
        let mut settings = Settings::default();
        settings
            .via
            .insert("https://i.redd.it/".to_string(), "http://cache/".to_string());
        let text = toml::to_string_pretty(&settings).unwrap();
        assert!(text.contains("preset = \"single\""));
        assert!(text.contains("[via]"));
    }
}
