use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use tracker_engine::{PollSettings, PushSettings, TrackerSettings};

use super::logging::LogDestination;

/// Follow the extraction status of an uploaded document until it finishes.
#[derive(Debug, Clone, Parser)]
#[command(name = "status-tracker", version)]
pub struct Cli {
    /// Document id to follow.
    pub job_id: String,

    /// RON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Base URL of the web application (poll endpoint host).
    #[arg(long)]
    pub server: Option<String>,

    /// WebSocket URL for real-time updates.
    #[arg(long)]
    pub push_url: Option<String>,

    /// Poll only; never open a push connection.
    #[arg(long)]
    pub no_push: bool,

    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    #[arg(long)]
    pub staleness_ms: Option<u64>,

    #[arg(long, value_enum)]
    pub log: Option<LogDestination>,

    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

/// Settings read from the optional config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server_url: String,
    pub push_url: Option<String>,
    pub poll_interval_ms: u64,
    pub staleness_ms: u64,
    pub reconnect: ReconnectConfig,
    pub log: LogDestination,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            push_url: None,
            poll_interval_ms: 3_000,
            staleness_ms: 30_000,
            reconnect: ReconnectConfig::default(),
            log: LogDestination::Terminal,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        ron::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Command-line flags win over file values.
    pub fn apply_cli(mut self, cli: &Cli) -> Self {
        if let Some(server) = &cli.server {
            self.server_url = server.clone();
        }
        if let Some(push_url) = &cli.push_url {
            self.push_url = Some(push_url.clone());
        }
        if cli.no_push {
            self.push_url = None;
        }
        if let Some(interval) = cli.poll_interval_ms {
            self.poll_interval_ms = interval;
        }
        if let Some(staleness) = cli.staleness_ms {
            self.staleness_ms = staleness;
        }
        if let Some(log) = cli.log {
            self.log = log;
        }
        if let Some(level) = &cli.log_level {
            self.log_level = level.clone();
        }
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.staleness_ms == 0 {
            bail!("staleness_ms must be greater than zero");
        }
        if self.reconnect.base_delay_ms == 0 {
            bail!("reconnect.base_delay_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            staleness_threshold: Duration::from_millis(self.staleness_ms),
            ..TrackerSettings::default()
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_millis(self.poll_interval_ms),
            staleness_threshold: Duration::from_millis(self.staleness_ms),
            ..PollSettings::default()
        }
    }

    pub fn push_settings(&self) -> PushSettings {
        PushSettings {
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: self.reconnect.max_attempts,
            ..PushSettings::default()
        }
    }
}
