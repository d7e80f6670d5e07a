//! Mock Engine (§4.4): executes a GraphQL operation against a cached schema, producing a
//! schema-conformant `{data?, errors?}` response via the layered resolver map, or
//! short-circuiting introspection queries to return the cached SDL directly.
pub mod generate;
pub mod resolvers;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::validation::Valid;
use serde_json_bytes::{Value, json};
use tracing::{debug, error};

use crate::error::{ProxyError, ProxyResult};
use crate::schema_cache::CachedSchemaEntry;
use generate::{GenerationConfig, ResponseBuilder};
use resolvers::{ResolverCache, ResolverMap, ResolverSource};

/// Normalizes a query the same way as the introspection short-circuit check (§4.1):
/// strip whitespace runs down to single spaces, drop `#`-prefixed line comments, and
/// lowercase, then compare against the canonical federation introspection query text.
pub fn is_introspection_query(query: &str) -> bool {
    let stripped: String = query
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ");
    let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    normalized == crate::schema_cache::FEDERATION_INTROSPECTION_QUERY.to_lowercase()
}

pub struct MockEngine {
    resolver_cache: ResolverCache,
    generation: GenerationConfig,
}

impl MockEngine {
    pub fn new(resolver_cache: ResolverCache) -> Self {
        Self {
            resolver_cache,
            generation: GenerationConfig::default(),
        }
    }

    pub async fn invalidate_resolvers(&self) {
        self.resolver_cache.invalidate().await;
    }

    /// Executes `query` against `entry`'s compiled schema for subgraph `subgraph_name`,
    /// honoring the introspection short-circuit and the resolver precedence of §4.4.
    pub async fn handle(
        &self,
        subgraph_name: &str,
        entry: &CachedSchemaEntry,
        query: &str,
        operation_name: Option<&str>,
        overrides: Option<&ResolverMap>,
    ) -> ProxyResult<Value> {
        if query.trim().is_empty() {
            return Err(ProxyError::BadRequest("query must be a non-empty string".to_string()));
        }

        if is_introspection_query(query) {
            return Ok(json!({ "data": { "_service": { "sdl": entry.sdl.as_ref() } } }));
        }

        let op_name = operation_name.unwrap_or("unknown");
        let schema: &Valid<_> = entry.schema.as_ref();
        let doc = ExecutableDocument::parse_and_validate(schema, query, op_name).map_err(|err| {
            let errs: Vec<_> = err.errors.iter().map(|d| d.to_string()).collect();
            error!(?errs, "graphql validation failed");
            ProxyError::GraphqlValidationError(errs.join("; "))
        })?;

        let resolved_name = resolved_operation_name(&doc, operation_name);
        let op = doc
            .operations
            .get(resolved_name.as_deref())
            .map_err(|_| ProxyError::GraphqlParseError("no matching operation found".to_string()))?;

        debug!(subgraph = %subgraph_name, op_name = ?resolved_name, "mock engine executing operation");

        let source: ResolverSource = self.resolver_cache.get().await;
        let mut builder =
            ResponseBuilder::new(&doc, schema, &self.generation, &source, overrides, subgraph_name);

        let data = builder
            .selection_set(&op.selection_set)
            .map_err(|err| ProxyError::MockGenerationError(err.to_string()))?;

        Ok(json!({ "data": Value::Object(data) }))
    }
}

fn resolved_operation_name(doc: &Valid<ExecutableDocument>, requested: Option<&str>) -> Option<String> {
    if requested.is_some() {
        return requested.map(str::to_string);
    }
    doc.operations.iter().next().and_then(|op| op.name.as_ref()).map(|n| n.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::resolvers::InMemoryResolverSourceLoader;
    use crate::schema_cache::CachedSchemaEntry;
    use std::time::Duration;

    const SDL: &str = "type Product { id: ID! name: String! inStock: Boolean! } \
                        type Query { product: Product! products: [Product!]! }";

    fn engine() -> MockEngine {
        MockEngine::new(ResolverCache::new(Box::new(InMemoryResolverSourceLoader(
            ResolverSource::default(),
        ))))
    }

    fn entry() -> CachedSchemaEntry {
        CachedSchemaEntry::for_test(SDL, Duration::from_secs(60))
    }

    #[test]
    fn recognizes_introspection_query_regardless_of_formatting() {
        assert!(is_introspection_query(
            "query SubgraphIntrospectQuery { _service { sdl } }"
        ));
        assert!(is_introspection_query(
            "  query   SubgraphIntrospectQuery  {\n  _service {\n sdl # comment\n }\n}  "
        ));
        assert!(!is_introspection_query("query { products { id } }"));
    }

    #[tokio::test]
    async fn introspection_short_circuits_to_cached_sdl() {
        let engine = engine();
        let entry = entry();
        let result = engine
            .handle(
                "products",
                &entry,
                "query SubgraphIntrospectQuery { _service { sdl } }",
                None,
                None,
            )
            .await
            .unwrap();

        assert_eq!(result["data"]["_service"]["sdl"].as_str(), Some(SDL));
    }

    #[tokio::test]
    async fn empty_query_is_bad_request_error() {
        let engine = engine();
        let entry = entry();
        let err = engine.handle("products", &entry, "   ", None, None).await.unwrap_err();
        assert!(matches!(err, ProxyError::BadRequest(_)));
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[tokio::test]
    async fn generates_schema_conformant_response() {
        let engine = engine();
        let entry = entry();
        let result = engine
            .handle("products", &entry, "query { product { id name inStock } }", None, None)
            .await
            .unwrap();

        let product = &result["data"]["product"];
        assert!(product["id"].is_string());
        assert!(product["inStock"].is_bool());
    }

    #[tokio::test]
    async fn invalid_query_is_graphql_validation_error() {
        let engine = engine();
        let entry = entry();
        let err = engine
            .handle("products", &entry, "query { nonExistentField }", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::GraphqlValidationError(_)));
    }
}
