#![allow(dead_code)]
//! Integration test harness: wires the same independently-testable components
//! `app::build` wires in production, but without going through the registry/CLI
//! layer, so each test controls exactly one subgraph's config and schema source.
use std::sync::Arc;
use std::time::Duration;

use http_body_util::BodyExt;
use hyper::{HeaderMap, StatusCode};
use subgraph_proxy::error::ProxyResult;
use subgraph_proxy::health::HealthMonitor;
use subgraph_proxy::mock::MockEngine;
use subgraph_proxy::mock::resolvers::{InMemoryResolverSourceLoader, ResolverCache, ResolverSource};
use subgraph_proxy::passthrough::PassthroughEngine;
use subgraph_proxy::router::{DecodedRequest, Router, decode_request};
use subgraph_proxy::schema_cache::{SchemaCache, SchemaSource, SdlSource};
use subgraph_proxy::subgraph_config::SubgraphConfig;

pub struct FakeSdlSource(pub String);

#[async_trait::async_trait]
impl SdlSource for FakeSdlSource {
    async fn fetch_sdl(&self, _subgraph_name: &str) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

pub struct Harness {
    pub health: Arc<HealthMonitor>,
    pub schema_cache: Arc<SchemaCache>,
    pub router: Arc<Router>,
}

/// Builds a harness whose Schema Cache falls back to `registry_sdl` for any subgraph
/// registered with `SchemaSource::ApolloRegistry`.
pub fn build(passthrough_enabled: bool, registry_sdl: &str) -> Harness {
    let health = Arc::new(HealthMonitor::new());
    let schema_cache = Arc::new(SchemaCache::with_schema_dir_and_registry(
        Duration::from_secs(300),
        std::env::temp_dir(),
        Some(Arc::new(FakeSdlSource(registry_sdl.to_string()))),
    ));
    let resolver_cache = ResolverCache::new(Box::new(InMemoryResolverSourceLoader(ResolverSource::default())));
    let mock_engine = Arc::new(MockEngine::new(resolver_cache));
    let passthrough_engine = Arc::new(PassthroughEngine::new());
    let router = Arc::new(Router::new(
        health.clone(),
        schema_cache.clone(),
        mock_engine,
        passthrough_engine,
        passthrough_enabled,
    ));
    Harness { health, schema_cache, router }
}

impl Harness {
    pub async fn register(&self, name: &str, url: Option<String>, config: SubgraphConfig, source: SchemaSource) {
        self.health.register(name.to_string(), url.clone(), config.clone());
        self.schema_cache.set_subgraph_config(name.to_string(), url, config, source).await;
    }

    fn decode(&self, encoded_segment: &str, subgraph_name: Option<&str>, body: &[u8]) -> ProxyResult<DecodedRequest> {
        let mut headers = HeaderMap::new();
        if let Some(name) = subgraph_name {
            headers.insert("x-subgraph-name", name.parse().unwrap());
        }
        decode_request(headers, encoded_segment, body)
    }

    /// Percent-encodes `target_url`, decodes/routes a request as the HTTP surface would,
    /// and returns `(status, headers, json body)`.
    pub async fn send(
        &self,
        target_url: &str,
        subgraph_name: Option<&str>,
        body: &[u8],
    ) -> (StatusCode, HeaderMap, serde_json_bytes::Value) {
        let encoded = percent_encoding::utf8_percent_encode(target_url, percent_encoding::NON_ALPHANUMERIC).to_string();
        self.send_raw_path(&encoded, subgraph_name, body).await
    }

    /// Like [`Harness::send`] but takes the already-percent-encoded (or deliberately
    /// malformed) path segment directly, for testing decode failures.
    pub async fn send_raw_path(
        &self,
        encoded_segment: &str,
        subgraph_name: Option<&str>,
        body: &[u8],
    ) -> (StatusCode, HeaderMap, serde_json_bytes::Value) {
        let resp = match self.decode(encoded_segment, subgraph_name, body) {
            Ok(decoded) => self.router.handle(decoded, body).await,
            Err(err) => err.into_response(),
        };

        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json_bytes::Value = serde_json_bytes::serde_json::from_slice(&bytes).unwrap_or(serde_json_bytes::Value::Null);
        (status, headers, value)
    }
}

pub fn graphql_body(query: &str) -> Vec<u8> {
    serde_json_bytes::serde_json::to_vec(&serde_json_bytes::serde_json::json!({ "query": query })).unwrap()
}
