use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_MAX_CONCURRENCY: usize = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub bangumi_base_url: String,
    /// Upper bound on subjects resolved in parallel for one request
    pub max_concurrency: usize,
    /// Deadline for each individual upstream call
    pub upstream_timeout_secs: u64,
    /// Deadline for a whole inbound request
    pub request_timeout_secs: u64,
    pub enable_request_logging: bool,
    /// Postgres cache store; the in-process store is used when unset
    pub database_url: Option<String>,
    pub cache_sweep_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            bangumi_base_url: "https://api.bgm.tv".to_string(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            upstream_timeout_secs: 10,
            request_timeout_secs: 60,
            enable_request_logging: false,
            database_url: None,
            cache_sweep_interval_secs: 300,
        }
    }
}

impl AppConfig {
    /// Defaults, then `episode-calendar.toml` if present, then environment.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", 3000_i64)?
            .set_default("bangumi_base_url", "https://api.bgm.tv")?
            .set_default("max_concurrency", DEFAULT_MAX_CONCURRENCY as i64)?
            .set_default("upstream_timeout_secs", 10_i64)?
            .set_default("request_timeout_secs", 60_i64)?
            .set_default("enable_request_logging", false)?
            .set_default("cache_sweep_interval_secs", 300_i64)?
            .add_source(config::File::with_name("episode-calendar").required(false))
            .add_source(config::Environment::default())
            .build()
            .context("Failed to load configuration")?;

        let config: AppConfig = settings
            .try_deserialize()
            .context("Invalid configuration value")?;

        Ok(config.normalized())
    }

    fn normalized(mut self) -> Self {
        self.bangumi_base_url = self.bangumi_base_url.trim_end_matches('/').to_string();
        if self.max_concurrency == 0 {
            self.max_concurrency = DEFAULT_MAX_CONCURRENCY;
        }
        self.database_url = self.database_url.filter(|url| !url.trim().is_empty());
        self
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sweep_interval_secs.max(1))
    }
}
