//! Resolver sourcing (§4.4): a declarative substitute for the original system's
//! JS/TS `mocks.js` module loading. A `ResolverSourceLoader` returns a `ResolverSource`
//! (`{_globals?, <subgraphName>?}`) of fixed-value declarations per type, which the Mock
//! Engine layers on top of its built-in scalar/enum generators.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::warn;

/// One field's fixed-value declaration: a literal value, a fixed set to choose from, or a
/// numeric range, as written under a type name in `mocks.yaml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldMock {
    Value { value: serde_json_bytes::Value },
    Enum { r#enum: Vec<String> },
    Range { range: [i64; 2] },
}

/// Type name -> field name -> fixed-value declaration.
pub type ResolverMap = HashMap<String, HashMap<String, FieldMock>>;

/// The parsed shape of `mocks.yaml`: an optional subgraph-agnostic `_globals` map plus any
/// number of subgraph-specific maps keyed by subgraph name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolverSource {
    #[serde(rename = "_globals", default)]
    pub globals: ResolverMap,
    #[serde(flatten)]
    pub per_subgraph: HashMap<String, ResolverMap>,
}

#[async_trait::async_trait]
pub trait ResolverSourceLoader: Send + Sync {
    async fn load(&self) -> Result<ResolverSource>;
}

/// Production loader: reads `mocks.yaml` from a configured directory. Per §4.4, a missing
/// or malformed file is not fatal — the caller logs and proceeds with defaults.
pub struct FileResolverSourceLoader {
    path: PathBuf,
}

impl FileResolverSourceLoader {
    pub fn new(mocks_dir: &Path) -> Self {
        Self {
            path: mocks_dir.join("mocks.yaml"),
        }
    }
}

#[async_trait::async_trait]
impl ResolverSourceLoader for FileResolverSourceLoader {
    async fn load(&self) -> Result<ResolverSource> {
        if !self.path.exists() {
            return Ok(ResolverSource::default());
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading resolver file {}", self.path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing resolver file {}", self.path.display()))
    }
}

/// Test-only loader backed by an in-memory value, used in place of a `mocks.yaml` file.
pub struct InMemoryResolverSourceLoader(pub ResolverSource);

#[async_trait::async_trait]
impl ResolverSourceLoader for InMemoryResolverSourceLoader {
    async fn load(&self) -> Result<ResolverSource> {
        Ok(self.0.clone())
    }
}

/// Caches the loaded `ResolverSource` until an explicit invalidation, refreshed on the
/// same TTL cadence as the Schema Cache (§4.4).
pub struct ResolverCache {
    loader: Box<dyn ResolverSourceLoader>,
    cached: RwLock<Option<ResolverSource>>,
}

impl ResolverCache {
    pub fn new(loader: Box<dyn ResolverSourceLoader>) -> Self {
        Self {
            loader,
            cached: RwLock::new(None),
        }
    }

    /// Returns the cached source, loading it on first use. A load failure is logged and
    /// yields an empty source rather than propagating (§4.4: "proceed without custom
    /// mocks").
    pub async fn get(&self) -> ResolverSource {
        if let Some(source) = self.cached.read().await.as_ref() {
            return source.clone();
        }

        let source = self.loader.load().await.unwrap_or_else(|err| {
            warn!(%err, "failed to load mock resolver source, proceeding with defaults");
            ResolverSource::default()
        });
        *self.cached.write().await = Some(source.clone());
        source
    }

    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Builds the per-call resolver map for `type_name` within `subgraph_name`, applying
    /// the precedence from §4.4: globals, then subgraph-specific, then any per-call
    /// override, each a whole-type replacement over the previous layer.
    pub fn resolve_for_type<'a>(
        source: &'a ResolverSource,
        subgraph_name: &str,
        overrides: Option<&'a ResolverMap>,
        type_name: &str,
    ) -> Option<&'a HashMap<String, FieldMock>> {
        overrides
            .and_then(|m| m.get(type_name))
            .or_else(|| source.per_subgraph.get(subgraph_name).and_then(|m| m.get(type_name)))
            .or_else(|| source.globals.get(type_name))
    }
}
