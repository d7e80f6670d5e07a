//! Schema Cache (§4.3): a per-subgraph-name TTL store of compiled schemas, with
//! multi-source loading, concurrent warming, and a single periodic refresher — grounded
//! in the teacher's `Arc<RwLock<FederatedSchema>>` ownership pattern (`state/mod.rs`) and
//! its `apollo_compiler::Schema::parse` + `.validate()` loading pipeline.
pub mod introspection;
pub mod loader;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{info, warn};

pub use introspection::{FEDERATION_INTROSPECTION_QUERY, IntrospectionError, introspect};

use crate::subgraph_config::SubgraphConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSource {
    LocalFile,
    LocalIntrospection,
    ApolloRegistry,
}

#[derive(Clone)]
pub struct CachedSchemaEntry {
    pub schema: Arc<Valid<Schema>>,
    pub sdl: Arc<str>,
    pub version: String,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl CachedSchemaEntry {
    fn build(sdl: String, ttl: Duration) -> anyhow::Result<Self> {
        let version = hex_sha256(&sdl);
        let schema = Schema::parse_and_validate(sdl.clone(), "schema.graphql")
            .map_err(|err| anyhow::anyhow!("{err}"))?;
        let fetched_at = chrono::Utc::now();
        Ok(Self {
            schema: Arc::new(schema),
            sdl: Arc::from(sdl.into_boxed_str()),
            version,
            fetched_at,
            expires_at: fetched_at + chrono::Duration::from_std(ttl).unwrap_or_default(),
        })
    }

    fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }

    #[cfg(test)]
    pub fn for_test(sdl: &str, ttl: Duration) -> Self {
        Self::build(sdl.to_string(), ttl).expect("test SDL must parse and validate")
    }
}

fn hex_sha256(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

struct SubgraphSchemaConfig {
    url: Option<String>,
    config: Arc<SubgraphConfig>,
    source: SchemaSource,
}

/// A schema source collaborator: the registry client, abstracted so the cache doesn't
/// depend on `reqwest` / Apollo Studio directly (mirrors `ResolverSourceLoader`).
#[async_trait::async_trait]
pub trait SdlSource: Send + Sync {
    async fn fetch_sdl(&self, subgraph_name: &str) -> anyhow::Result<String>;
}

#[async_trait::async_trait]
impl SdlSource for crate::registry::ApolloRegistryClient {
    async fn fetch_sdl(&self, subgraph_name: &str) -> anyhow::Result<String> {
        crate::registry::RegistryClient::fetch_sdl(self, subgraph_name).await
    }
}

pub struct SchemaCache {
    entries: RwLock<HashMap<String, CachedSchemaEntry>>,
    configs: RwLock<HashMap<String, SubgraphSchemaConfig>>,
    ttl: Duration,
    schema_dir: PathBuf,
    registry: Option<Arc<dyn SdlSource>>,
    refresh_task: std::sync::Mutex<Option<AbortHandle>>,
}

impl SchemaCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_schema_dir_and_registry(ttl, PathBuf::from("schemas"), None)
    }

    pub fn with_schema_dir_and_registry(
        ttl: Duration,
        schema_dir: PathBuf,
        registry: Option<Arc<dyn SdlSource>>,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            configs: RwLock::new(HashMap::new()),
            ttl,
            schema_dir,
            registry,
            refresh_task: std::sync::Mutex::new(None),
        }
    }

    pub async fn set_subgraph_config(
        &self,
        name: String,
        url: Option<String>,
        config: SubgraphConfig,
        source: SchemaSource,
    ) {
        self.configs.write().await.insert(
            name,
            SubgraphSchemaConfig {
                url,
                config: Arc::new(config),
                source,
            },
        );
    }

    pub async fn has(&self, name: &str) -> bool {
        match self.entries.read().await.get(name) {
            Some(entry) => !entry.is_expired(chrono::Utc::now()),
            None => false,
        }
    }

    /// Returns a cached schema, loading it from its configured source on a cache miss.
    /// Concurrent misses may each trigger a redundant load (§4.3); the last writer wins.
    pub async fn get_schema(&self, name: &str) -> anyhow::Result<CachedSchemaEntry> {
        if let Some(entry) = self.entries.read().await.get(name)
            && !entry.is_expired(chrono::Utc::now())
        {
            return Ok(entry.clone());
        }

        let entry = self.load(name).await?;
        self.entries
            .write()
            .await
            .insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    async fn load(&self, name: &str) -> anyhow::Result<CachedSchemaEntry> {
        let sdl = self.load_sdl(name).await?;
        CachedSchemaEntry::build(sdl, self.ttl)
    }

    async fn load_sdl(&self, name: &str) -> anyhow::Result<String> {
        let configs = self.configs.read().await;
        let cfg = configs
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no schema configuration recorded for '{name}'"))?;

        match cfg.source {
            SchemaSource::LocalFile => {
                let file = cfg
                    .config
                    .schema_file
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("'{name}' has no schemaFile configured"))?;
                loader::load_local_file(&self.schema_dir, file).await
            }
            SchemaSource::LocalIntrospection => {
                let url = cfg
                    .url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("'{name}' has useLocalSchema but no URL"))?;
                introspection::introspect(&url, &cfg.config)
                    .await
                    .map_err(|err| anyhow::anyhow!("introspecting '{name}': {err}"))
            }
            SchemaSource::ApolloRegistry => {
                let registry = self
                    .registry
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("no registry client configured"))?;
                registry.fetch_sdl(name).await
            }
        }
    }

    /// Concurrently loads many subgraphs' schemas; individual failures are logged and
    /// do not abort the others (§4.3).
    pub async fn warm_cache(&self, names: &[String]) {
        let results = join_all(names.iter().map(|name| async move {
            let result = self.get_schema(name).await;
            (name.clone(), result)
        }))
        .await;

        for (name, result) in results {
            match result {
                Ok(_) => info!(subgraph = %name, "warmed schema cache"),
                Err(err) => warn!(subgraph = %name, %err, "failed to warm schema cache"),
            }
        }
    }

    /// Starts the single background refresher, re-loading exactly the currently-cached
    /// names every TTL. Calling this twice is a fatal usage error (§4.3).
    pub fn start_periodic_refresh(self: &Arc<Self>) {
        let mut guard = self.refresh_task.lock().unwrap();
        assert!(
            guard.is_none(),
            "SchemaCache::start_periodic_refresh called twice"
        );

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.ttl);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let names: Vec<String> = this.entries.read().await.keys().cloned().collect();
                for name in names {
                    match this.load(&name).await {
                        Ok(entry) => {
                            this.entries.write().await.insert(name.clone(), entry);
                        }
                        Err(err) => warn!(subgraph = %name, %err, "periodic schema refresh failed"),
                    }
                }
            }
        });
        *guard = Some(handle.abort_handle());
    }

    pub fn stop_periodic_refresh(&self) {
        if let Some(handle) = self.refresh_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
