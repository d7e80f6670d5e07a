//! Wires the independently-testable components (§2) into one running server:
//! owns the shared `Arc`s, runs startup initialization, and exposes the state
//! the HTTP surface (`http::serve`) is built against.
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::env_config::EnvConfig;
use crate::health::HealthMonitor;
use crate::mock::MockEngine;
use crate::mock::resolvers::{FileResolverSourceLoader, ResolverCache};
use crate::passthrough::PassthroughEngine;
use crate::registry::{self, ApolloRegistryClient, NullRegistryClient, RegistryClient};
use crate::router::Router;
use crate::schema_cache::{SchemaCache, SdlSource};

pub struct AppState {
    pub health: Arc<HealthMonitor>,
    pub schema_cache: Arc<SchemaCache>,
    pub router: Arc<Router>,
    pub env: EnvConfig,
    pub started_at: DateTime<Utc>,
    pub shutting_down: Arc<AtomicBool>,
}

impl AppState {
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    /// Cancels background timers and marks the server not-ready, for use in the
    /// shutdown grace window described in §5 (default 30 s).
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        self.health.shutdown();
        self.schema_cache.stop_periodic_refresh();
    }
}

/// Builds and initializes the whole application per §4.6: constructs every
/// component, runs the three-phase registry initialization, then starts the
/// background refreshers.
pub async fn build(env: EnvConfig, config_path: Option<PathBuf>, mocks_dir: PathBuf, schema_dir: PathBuf) -> anyhow::Result<Arc<AppState>> {
    let health = Arc::new(HealthMonitor::with_timeout(env.subgraph_health_timeout));

    let registry_client: Arc<dyn RegistryClient> = match (&env.apollo_key, &env.apollo_graph_id) {
        (Some(key), Some(graph_id)) => Arc::new(ApolloRegistryClient::new(
            graph_id.clone(),
            env.apollo_graph_variant.clone(),
            key.clone(),
        )),
        _ => {
            info!("no APOLLO_KEY/APOLLO_GRAPH_ID configured, registry discovery disabled");
            Arc::new(NullRegistryClient)
        }
    };

    let sdl_source: Arc<dyn SdlSource> = {
        struct Bridge(Arc<dyn RegistryClient>);
        #[async_trait::async_trait]
        impl SdlSource for Bridge {
            async fn fetch_sdl(&self, subgraph_name: &str) -> anyhow::Result<String> {
                self.0.fetch_sdl(subgraph_name).await
            }
        }
        Arc::new(Bridge(registry_client.clone()))
    };

    let schema_cache = Arc::new(SchemaCache::with_schema_dir_and_registry(
        env.schema_cache_ttl,
        schema_dir,
        Some(sdl_source),
    ));

    registry::initialize(registry_client.as_ref(), config_path.as_deref(), &env, &health, &schema_cache).await?;

    schema_cache.start_periodic_refresh();

    let resolver_cache = ResolverCache::new(Box::new(FileResolverSourceLoader::new(&mocks_dir)));
    let mock_engine = Arc::new(MockEngine::new(resolver_cache));
    let passthrough_engine = Arc::new(PassthroughEngine::new());

    let router = Arc::new(Router::new(
        health.clone(),
        schema_cache.clone(),
        mock_engine,
        passthrough_engine,
        env.enable_passthrough,
    ));

    Ok(Arc::new(AppState {
        health,
        schema_cache,
        router,
        env,
        started_at: Utc::now(),
        shutting_down: Arc::new(AtomicBool::new(false)),
    }))
}
