//! End-to-end scenarios 4, 5 and 6 from SPEC_FULL.md §8: mocking from a registry-sourced
//! schema, passthrough against a live healthy subgraph, and introspection cache fallback
//! when the upstream connection is refused.
mod harness;

use subgraph_proxy::schema_cache::SchemaSource;
use subgraph_proxy::subgraph_config::SubgraphConfig;
use wiremock::matchers::{body_string_contains, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PRODUCT_SDL: &str = "type Product { id: ID! name: String price: Float } type Query { products: [Product!]! }";

#[tokio::test]
async fn mocks_from_registry_sourced_schema() {
    let h = harness::build(false, PRODUCT_SDL);
    h.register("products", None, SubgraphConfig::default(), SchemaSource::ApolloRegistry).await;

    let (status, headers, body) = h
        .send(
            "http://products:4001/graphql",
            Some("products"),
            &harness::graphql_body("query Q { products { id name price } }"),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(headers.get("x-proxy-mode").unwrap(), "mock");
    assert!(body["data"]["products"].as_array().is_some());
}

#[tokio::test]
async fn passes_through_when_subgraph_is_healthy() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("__typename"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json_bytes::serde_json::json!({})))
        .mount(&upstream)
        .await;

    let expected = serde_json_bytes::serde_json::json!({
        "data": { "products": [{ "id": "p1", "name": "x", "price": 1.5 }] }
    });
    Mock::given(method("POST"))
        .and(body_string_contains("products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(expected.clone()))
        .mount(&upstream)
        .await;

    let h = harness::build(true, PRODUCT_SDL);
    h.register(
        "products",
        Some(format!("{}/graphql", upstream.uri())),
        SubgraphConfig::default(),
        SchemaSource::ApolloRegistry,
    )
    .await;

    let target = format!("{}/graphql", upstream.uri());
    let (status, headers, body) = h
        .send(&target, Some("products"), &harness::graphql_body("query Q { products { id name price } }"))
        .await;

    assert_eq!(status, 200);
    assert_eq!(headers.get("x-proxy-mode").unwrap(), "passthrough");
    assert_eq!(body, serde_json_bytes::Value::from(expected));
}

#[tokio::test]
async fn introspection_falls_back_to_cache_on_connection_refused() {
    let h = harness::build(true, PRODUCT_SDL);
    // Nothing is listening on this port, so the passthrough attempt is connection-refused.
    h.register(
        "products",
        Some("http://127.0.0.1:9/graphql".to_string()),
        SubgraphConfig::default(),
        SchemaSource::ApolloRegistry,
    )
    .await;
    // Simulate a prior successful probe so the router attempts passthrough directly,
    // rather than re-probing the now-unreachable port itself.
    h.health.set_health("products", true).unwrap();

    let (status, headers, body) = h
        .send(
            "http://127.0.0.1:9/graphql",
            Some("products"),
            &harness::graphql_body(subgraph_proxy::schema_cache::FEDERATION_INTROSPECTION_QUERY),
        )
        .await;

    assert_eq!(status, 200);
    assert_eq!(headers.get("x-proxy-mode").unwrap(), "passthrough-introspection-cached");
    assert_eq!(headers.get("x-cache-fallback").unwrap(), "true");
    assert!(body["data"]["_service"]["sdl"].as_str().unwrap().contains("type Product"));
}
