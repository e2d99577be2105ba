use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::Deserialize;

/// Environment variable that overrides `discord.token`.
pub const TOKEN_ENV: &str = "BOT_TOKEN";

// ------------------------------------------------------------
// Root configuration
// ------------------------------------------------------------
//
// Top-level structure loaded from `config.json`.
//
// It defines:
// - Which server to collect and how to authenticate
// - Collector tuning (concurrency, paging, retries)
// - Where the archive lives
// - Optional debug configuration
//
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub discord: DiscordConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Optional debug configuration
    pub debug: Option<DebugConfig>,
}

// ------------------------------------------------------------
// Discord configuration
// ------------------------------------------------------------
//
// Notes:
// - The `token` is security-sensitive and must never be committed.
//   Prefer the BOT_TOKEN environment variable.
//
#[derive(Debug, Deserialize, Clone)]
pub struct DiscordConfig {
    /// Server (guild) to collect
    pub guild_id: u64,

    /// Bot token; filled from BOT_TOKEN when absent
    #[serde(default)]
    pub token: String,

    /// REST API root
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

// ------------------------------------------------------------
// Collector configuration
// ------------------------------------------------------------
//
// Passed explicitly into the collector at construction.
//
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CollectorConfig {
    /// Maximum number of channels fetched at once
    pub concurrency: usize,

    /// Items requested per page
    pub page_size: usize,

    /// Deadline for a single page request
    pub page_timeout_secs: u64,

    /// Retries for transient page failures before giving up
    pub max_retries: u32,

    /// First backoff step; doubled on every retry
    pub backoff_base_ms: u64,

    /// Log a progress line every N items per channel
    pub progress_every: usize,

    /// Abort the run (keeping the old archive) when any channel fails
    pub fail_on_partition_error: bool,

    /// Period of the metrics log line during collection
    pub metrics_interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            page_size: 500,
            page_timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 500,
            progress_every: 3000,
            fail_on_partition_error: false,
            metrics_interval_secs: 10,
        }
    }
}

impl CollectorConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ArchiveConfig {
    pub path: PathBuf,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("message_history.json") }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DebugConfig {
    /// Enables debug-level logging
    pub log: Option<bool>,
}

impl Config {
    pub fn debug_log(&self) -> bool {
        self.debug
            .as_ref()
            .map_or(false, |d| d.log.unwrap_or(false))
    }

    /// Rejects settings the collector cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.collector.concurrency == 0 {
            bail!("collector.concurrency must be at least 1");
        }
        if self.collector.page_size == 0 {
            bail!("collector.page_size must be at least 1");
        }
        if self.collector.progress_every == 0 {
            bail!("collector.progress_every must be at least 1");
        }
        Ok(())
    }
}

impl DiscordConfig {
    /// Only collection talks to Discord; reports work offline.
    pub fn require_token(&self) -> anyhow::Result<&str> {
        let token = self.token.trim();
        if token.is_empty() {
            bail!("discord token missing (set discord.token or {})", TOKEN_ENV);
        }
        Ok(token)
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

// ------------------------------------------------------------
// Configuration loader
// ------------------------------------------------------------
//
// Reads the JSON file, applies the token override from the
// environment and validates the result.
//
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&data, std::env::var(TOKEN_ENV).ok())
}

pub fn parse_config(data: &str, token_override: Option<String>) -> anyhow::Result<Config> {
    let mut cfg: Config = serde_json::from_str(data).context("parsing config")?;

    if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
        cfg.discord.token = token;
    }

    cfg.validate()?;
    Ok(cfg)
}
