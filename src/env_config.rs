//! Environment-derived configuration, read once at startup. Peripheral per the spec
//! (environment-variable validation is an external collaborator contract), but still
//! typed and defaulted rather than read ad-hoc from `std::env` at each use site.
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub port: u16,
    pub apollo_key: Option<String>,
    pub apollo_graph_id: Option<String>,
    pub apollo_graph_variant: String,
    pub schema_cache_ttl: Duration,
    pub subgraph_check_interval: Duration,
    pub subgraph_health_timeout: Duration,
    pub enable_passthrough: bool,
    pub mock_on_error: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            port: 4000,
            apollo_key: None,
            apollo_graph_id: None,
            apollo_graph_variant: "current".to_string(),
            schema_cache_ttl: Duration::from_millis(300_000),
            subgraph_check_interval: Duration::from_millis(30_000),
            subgraph_health_timeout: Duration::from_millis(5_000),
            enable_passthrough: true,
            mock_on_error: true,
        }
    }
}

impl EnvConfig {
    /// Reads and validates configuration from the process environment, falling back to
    /// the documented defaults (§6) for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(port) = std::env::var("PORT") {
            cfg.port = port.parse().context("PORT must be a valid u16")?;
        }
        cfg.apollo_key = std::env::var("APOLLO_KEY").ok();
        cfg.apollo_graph_id = std::env::var("APOLLO_GRAPH_ID").ok();
        if let Ok(variant) = std::env::var("APOLLO_GRAPH_VARIANT") {
            cfg.apollo_graph_variant = variant;
        }
        cfg.schema_cache_ttl = duration_ms_env("SCHEMA_CACHE_TTL_MS", cfg.schema_cache_ttl)?;
        cfg.subgraph_check_interval =
            duration_ms_env("SUBGRAPH_CHECK_INTERVAL_MS", cfg.subgraph_check_interval)?;
        cfg.subgraph_health_timeout =
            duration_ms_env("SUBGRAPH_HEALTH_TIMEOUT_MS", cfg.subgraph_health_timeout)?;
        cfg.enable_passthrough = bool_env("ENABLE_PASSTHROUGH", cfg.enable_passthrough)?;
        cfg.mock_on_error = bool_env("MOCK_ON_ERROR", cfg.mock_on_error)?;

        Ok(cfg)
    }
}

fn duration_ms_env(name: &str, default: Duration) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => {
            let ms: u64 = raw
                .parse()
                .with_context(|| format!("{name} must be an integer number of milliseconds"))?;
            Ok(Duration::from_millis(ms))
        }
        Err(_) => Ok(default),
    }
}

fn bool_env(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => anyhow::bail!("{name} must be a boolean, got '{other}'"),
        },
        Err(_) => Ok(default),
    }
}
