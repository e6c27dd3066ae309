use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use fuzzdex_core::{
    Compression, ContentStore, ErrorRate, FingerprintConfig, FingerprintMode, Fingerprinter,
    DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_ROOT, DEFAULT_ERROR_RATE, DEFAULT_INDEX_WORKERS,
    DEFAULT_LOG_FILE, DEFAULT_MIN_SAMPLED_SIZE, DEFAULT_SAMPLE_RATE, DEFAULT_SEARCH_WORKERS,
};
use serde::Deserialize;

pub const DEFAULT_CONFIG: &str = "fuzzdex.yaml";
/// Consulted in order when `--config` is not given.
const CONFIG_ENV_VARS: [&str; 2] = ["FUZZDEX_CONFIG", "CONFIG_PATH"];

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fingerprint: FingerprintSection,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,
    #[serde(default = "default_index_threads")]
    pub thread_count_index: usize,
    #[serde(default = "default_search_threads")]
    pub thread_count_search: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            error_rate: default_error_rate(),
            thread_count_index: default_index_threads(),
            thread_count_search: default_search_threads(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_content_root")]
    pub content_root: PathBuf,
    #[serde(default)]
    pub store_content: bool,
    #[serde(default)]
    pub compression: Compression,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            content_root: default_content_root(),
            store_content: false,
            compression: Compression::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FingerprintSection {
    #[serde(default)]
    pub mode: FingerprintMode,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f64,
    #[serde(default = "default_min_sampled_size")]
    pub min_sampled_size: u64,
}

impl Default for FingerprintSection {
    fn default() -> Self {
        Self {
            mode: FingerprintMode::default(),
            chunk_size: default_chunk_size(),
            sample_rate: default_sample_rate(),
            min_sampled_size: default_min_sampled_size(),
        }
    }
}

fn default_error_rate() -> f64 {
    DEFAULT_ERROR_RATE
}

fn default_index_threads() -> usize {
    DEFAULT_INDEX_WORKERS
}

fn default_search_threads() -> usize {
    DEFAULT_SEARCH_WORKERS
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

fn default_content_root() -> PathBuf {
    PathBuf::from(DEFAULT_CONTENT_ROOT)
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_sample_rate() -> f64 {
    DEFAULT_SAMPLE_RATE
}

fn default_min_sampled_size() -> u64 {
    DEFAULT_MIN_SAMPLED_SIZE
}

impl AppConfig {
    /// Rejects values the core would refuse later, so mistakes surface before
    /// any file is touched.
    pub fn validate(&self) -> Result<()> {
        self.error_rate()?;
        if self.general.thread_count_index == 0 {
            bail!("general.thread_count_index must be at least 1");
        }
        if self.general.thread_count_search == 0 {
            bail!("general.thread_count_search must be at least 1");
        }
        self.fingerprinter()?;
        Ok(())
    }

    pub fn error_rate(&self) -> Result<ErrorRate> {
        ErrorRate::new(self.general.error_rate).context("invalid general.error_rate")
    }

    pub fn fingerprinter(&self) -> Result<Fingerprinter> {
        let section = &self.fingerprint;
        Fingerprinter::new(FingerprintConfig {
            mode: section.mode,
            chunk_size: section.chunk_size,
            sample_rate: section.sample_rate,
            min_sampled_size: section.min_sampled_size,
        })
        .context("invalid fingerprint section")
    }

    pub fn content_store(&self) -> Option<ContentStore> {
        self.storage
            .store_content
            .then(|| ContentStore::new(&self.storage.content_root, self.storage.compression))
    }
}

pub fn config_path(flag: Option<PathBuf>) -> PathBuf {
    resolve_config_path(flag, |name| env::var(name).ok())
}

fn resolve_config_path(flag: Option<PathBuf>, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    flag.or_else(|| {
        CONFIG_ENV_VARS
            .iter()
            .find_map(|name| lookup(name).filter(|value| !value.is_empty()))
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(AppConfig::default());
    }
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&contents).map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
    } else {
        serde_yaml::from_str(&contents)
            .map_err(|e| anyhow!("invalid config {}: {e}", path.display()))
    }
}

pub fn parse_compression(value: &str) -> Result<Compression> {
    match value.to_lowercase().as_str() {
        "none" => Ok(Compression::None),
        "gzip" | "gz" => Ok(Compression::Gzip),
        "zstd" | "zst" => Ok(Compression::Zstd),
        other => Err(anyhow!("unknown compression {other} (expected none, gzip or zstd)")),
    }
}

pub fn parse_mode(value: &str) -> Result<FingerprintMode> {
    match value.to_lowercase().as_str() {
        "whole" => Ok(FingerprintMode::Whole),
        "sampled" => Ok(FingerprintMode::Sampled),
        other => Err(anyhow!("unknown fingerprint mode {other} (expected whole or sampled)")),
    }
}
