//! Thin collaborator for the Apollo schema registry. The registry is an external system;
//! this client only does enough to satisfy the Subgraph Registry / Config Loader's needs:
//! list the subgraphs of a graph variant, and fetch a single subgraph's SDL.
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct RegistrySubgraph {
    pub name: String,
    pub url: Option<String>,
}

/// A registry client. Trait so tests can substitute an in-memory fake instead of hitting
/// the network (mirrors the `ResolverSourceLoader` substitution pattern used elsewhere).
#[async_trait::async_trait]
pub trait RegistryClient: Send + Sync {
    async fn list_subgraphs(&self) -> Result<Vec<RegistrySubgraph>>;
    async fn fetch_sdl(&self, subgraph_name: &str) -> Result<String>;
}

/// Used when no Apollo credentials are configured: every subgraph must then come from
/// the local config file, and any `ApolloRegistry`-sourced schema load fails loudly
/// rather than silently hanging on a network call.
pub struct NullRegistryClient;

#[async_trait::async_trait]
impl RegistryClient for NullRegistryClient {
    async fn list_subgraphs(&self) -> Result<Vec<RegistrySubgraph>> {
        Ok(Vec::new())
    }

    async fn fetch_sdl(&self, subgraph_name: &str) -> Result<String> {
        anyhow::bail!("no registry client configured, cannot fetch SDL for '{subgraph_name}'")
    }
}

pub struct ApolloRegistryClient {
    http: reqwest::Client,
    graph_id: String,
    variant: String,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct SubgraphListResponse {
    subgraphs: Vec<SubgraphEntry>,
}

#[derive(Debug, Deserialize)]
struct SubgraphEntry {
    name: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SdlResponse {
    sdl: String,
}

impl ApolloRegistryClient {
    pub fn new(graph_id: String, variant: String, api_key: String) -> Self {
        Self::with_endpoint(
            graph_id,
            variant,
            api_key,
            "https://api.apollographql.com/api/graphql".to_string(),
        )
    }

    pub fn with_endpoint(
        graph_id: String,
        variant: String,
        api_key: String,
        endpoint: String,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            graph_id,
            variant,
            api_key,
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl RegistryClient for ApolloRegistryClient {
    async fn list_subgraphs(&self) -> Result<Vec<RegistrySubgraph>> {
        let resp = self
            .http
            .get(format!(
                "{}/graphs/{}/variants/{}/subgraphs",
                self.endpoint, self.graph_id, self.variant
            ))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .context("fetching subgraph list from registry")?;

        if !resp.status().is_success() {
            anyhow::bail!("registry returned HTTP {}", resp.status());
        }

        let body: SubgraphListResponse = resp
            .json()
            .await
            .context("parsing registry subgraph list")?;

        Ok(body
            .subgraphs
            .into_iter()
            .map(|s| RegistrySubgraph {
                name: s.name,
                url: s.url,
            })
            .collect())
    }

    async fn fetch_sdl(&self, subgraph_name: &str) -> Result<String> {
        let resp = self
            .http
            .get(format!(
                "{}/graphs/{}/variants/{}/subgraphs/{}/sdl",
                self.endpoint, self.graph_id, self.variant, subgraph_name
            ))
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .with_context(|| format!("fetching SDL for '{subgraph_name}' from registry"))?;

        if !resp.status().is_success() {
            anyhow::bail!(
                "registry returned HTTP {} for subgraph '{subgraph_name}'",
                resp.status()
            );
        }

        let body: SdlResponse = resp
            .json()
            .await
            .with_context(|| format!("parsing registry SDL response for '{subgraph_name}'"))?;

        Ok(body.sdl)
    }
}
