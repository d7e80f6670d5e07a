//! Subgraph Registry / Config Loader (§4.6): three-phase startup that merges registry-
//! discovered subgraphs with local config overrides, then registers each with the Health
//! Monitor and Schema Cache.
pub mod client;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

pub use client::{ApolloRegistryClient, NullRegistryClient, RegistryClient, RegistrySubgraph};

use crate::env_config::EnvConfig;
use crate::health::HealthMonitor;
use crate::schema_cache::{SchemaCache, SchemaSource};
use crate::subgraph_config::{self, SubgraphConfig};

#[derive(Debug, Clone, Copy, Default)]
pub struct InitCounts {
    pub total_subgraphs: usize,
    pub from_apollo: usize,
    pub local_overrides: usize,
}

/// Runs the three-phase initialization described in §4.6 and leaves the Health Monitor
/// and Schema Cache populated and warmed. Returns the registry-vs-local-override counts
/// logged at startup.
pub async fn initialize(
    registry: &dyn RegistryClient,
    local_config_path: Option<&Path>,
    env: &EnvConfig,
    health: &Arc<HealthMonitor>,
    schema_cache: &Arc<SchemaCache>,
) -> Result<InitCounts> {
    // Phase 1: registry subgraph list.
    let registry_subgraphs = registry.list_subgraphs().await.unwrap_or_else(|err| {
        warn!(%err, "failed to list subgraphs from registry, continuing with none");
        Vec::new()
    });
    info!(count = registry_subgraphs.len(), "fetched registry subgraph list");

    // Phase 2: local config file, validated.
    let local_overrides: HashMap<String, SubgraphConfig> = match local_config_path {
        Some(path) => subgraph_config::load_config_file(path)?,
        None => HashMap::new(),
    };

    // Phase 3: register registry subgraphs with defaults, then re-register overridden ones.
    let mut by_url = HashMap::new();
    for sub in &registry_subgraphs {
        let cfg = SubgraphConfig {
            health_check_interval_ms: env.subgraph_check_interval.as_millis() as u64,
            ..Default::default()
        };
        health.register(sub.name.clone(), sub.url.clone(), cfg.clone());
        schema_cache
            .set_subgraph_config(sub.name.clone(), sub.url.clone(), cfg, default_schema_source())
            .await;
        if let Some(url) = &sub.url {
            by_url.insert(url.clone(), sub.name.clone());
        }
    }

    for (name, cfg) in &local_overrides {
        cfg.validate(name)?;
        let url = registry_subgraphs
            .iter()
            .find(|s| &s.name == name)
            .and_then(|s| s.url.clone());
        health.unregister(name);
        health.register(name.clone(), url.clone(), cfg.clone());
        schema_cache
            .set_subgraph_config(name.clone(), url, cfg.clone(), source_for(cfg))
            .await;
    }

    // Consistency check for the Open Question in §9: ENABLE_PASSTHROUGH=false combined
    // with any disableMocking=true subgraph leaves no viable routing path.
    if !env.enable_passthrough {
        for cfg in local_overrides.values() {
            if cfg.disable_mocking {
                anyhow::bail!(
                    "invalid configuration: ENABLE_PASSTHROUGH=false combined with \
                     disableMocking=true leaves no viable routing path"
                );
            }
        }
    }

    // Warm the schema cache for every registry-discovered name; per-name failures are
    // isolated (logged, not fatal).
    let names: Vec<String> = registry_subgraphs.iter().map(|s| s.name.clone()).collect();
    schema_cache.warm_cache(&names).await;

    let counts = InitCounts {
        total_subgraphs: health.len(),
        from_apollo: registry_subgraphs.len(),
        local_overrides: local_overrides.len(),
    };
    info!(
        total = counts.total_subgraphs,
        from_apollo = counts.from_apollo,
        local_overrides = counts.local_overrides,
        "subgraph registry initialized"
    );

    Ok(counts)
}

fn default_schema_source() -> SchemaSource {
    SchemaSource::ApolloRegistry
}

fn source_for(cfg: &SubgraphConfig) -> SchemaSource {
    if cfg.schema_file.is_some() {
        SchemaSource::LocalFile
    } else if cfg.use_local_schema {
        SchemaSource::LocalIntrospection
    } else {
        SchemaSource::ApolloRegistry
    }
}
