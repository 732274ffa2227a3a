// src/config/mod.rs
//! Application configuration.
//!
//! Lookup order: `$CRAWLER_CONFIG_PATH`, then `config/crawler.toml`, then the
//! copy compiled into the binary. A few knobs can be overridden from the
//! environment; channel endpoints live only in the environment
//! (see [`crate::notify::ChannelConfig`]).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::ingest::config::{validate_sources, CrawlerSettings, SourceDescriptor};
use crate::ledger::DEFAULT_LEDGER_CAP;
use crate::notify::FormatSettings;
use crate::scheduler::{validate_jobs, SchedulerSettings};

pub const DEFAULT_CONFIG_PATH: &str = "config/crawler.toml";
pub const ENV_CONFIG_PATH: &str = "CRAWLER_CONFIG_PATH";
pub const ENV_DATA_DIR: &str = "CRAWLER_DATA_DIR";
pub const ENV_MAX_PER_SOURCE: &str = "MAX_ARTICLES_PER_SITE";
pub const ENV_BIND_ADDR: &str = "CRAWLER_BIND_ADDR";

const BUILTIN_CONFIG: &str = include_str!("../../config/crawler.toml");

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_ledger_cap() -> usize {
    DEFAULT_LEDGER_CAP
}
fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_ledger_cap")]
    pub ledger_cap: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            ledger_cap: default_ledger_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Topical filter; matched case-insensitively as substrings.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub crawler: CrawlerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub notify: FormatSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

impl AppConfig {
    /// Resolve, parse, apply environment overrides, validate.
    pub fn load() -> Result<Self> {
        let (origin, content) = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let path = PathBuf::from(p);
                let content = read(&path)?;
                (path.display().to_string(), content)
            }
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                (DEFAULT_CONFIG_PATH.to_string(), read(Path::new(DEFAULT_CONFIG_PATH))?)
            }
            Err(_) => ("<built-in>".to_string(), BUILTIN_CONFIG.to_string()),
        };

        let mut cfg: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing config from {origin}"))?;
        cfg.apply_env_overrides();
        cfg.validate()
            .with_context(|| format!("invalid config from {origin}"))?;

        tracing::info!(
            origin = %origin,
            sources = cfg.sources.len(),
            keywords = cfg.keywords.len(),
            jobs = cfg.scheduler.jobs.len(),
            "config loaded"
        );
        Ok(cfg)
    }

    /// Parse and validate without consulting the environment.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// The configuration shipped with the crate.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_CONFIG)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_non_empty(ENV_DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = env_non_empty(ENV_MAX_PER_SOURCE) {
            match raw.parse::<u32>() {
                Ok(n) if n > 0 => self.crawler.max_items_per_source = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid {ENV_MAX_PER_SOURCE}"),
            }
        }
        if let Some(addr) = env_non_empty(ENV_BIND_ADDR) {
            self.server.bind_addr = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_sources(&self.sources)?;
        validate_jobs(&self.scheduler.jobs)?;
        if self.storage.ledger_cap == 0 {
            bail!("storage.ledger_cap must be at least 1");
        }
        if self.notify.max_items == 0 {
            bail!("notify.max_items must be at least 1");
        }
        if self.crawler.max_items_per_source == 0 {
            bail!("crawler.max_items_per_source must be at least 1");
        }
        Ok(())
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading config at {}", path.display()))
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
