//! End-to-end scenarios 1, 2, 3 and 7 from SPEC_FULL.md §8, driven through the full
//! decode -> route -> dispatch path (no live upstream involved).
mod harness;

use subgraph_proxy::subgraph_config::SubgraphConfig;

const PRODUCT_SDL: &str = "type Product { id: ID! name: String! } type Query { product: Product! }";

#[tokio::test]
async fn unknown_subgraph_is_schema_not_found() {
    let h = harness::build(true, PRODUCT_SDL);

    let (status, _headers, body) = h
        .send(
            "http://unknown:4000/graphql",
            Some("unknown"),
            &harness::graphql_body("{ __typename }"),
        )
        .await;

    assert_eq!(status, 404);
    assert_eq!(body["errors"][0]["extensions"]["code"].as_str(), Some("SCHEMA_NOT_FOUND"));
    assert!(body["errors"][0]["message"].as_str().unwrap().contains("unknown"));
}

#[tokio::test]
async fn missing_subgraph_header_is_rejected() {
    let h = harness::build(true, PRODUCT_SDL);

    let (status, _headers, body) = h
        .send("http://products:4001/graphql", None, &harness::graphql_body("{ __typename }"))
        .await;

    assert_eq!(status, 400);
    assert_eq!(body["errors"][0]["extensions"]["code"].as_str(), Some("INVALID_GRAPHQL_REQUEST"));
    assert!(body["errors"][0]["message"].as_str().unwrap().contains("x-subgraph-name"));
}

#[tokio::test]
async fn invalid_url_encoding_is_rejected() {
    let h = harness::build(true, PRODUCT_SDL);

    let (status, _headers, body) = h.send_raw_path("%ZZ", Some("products"), &harness::graphql_body("{ x }")).await;

    assert_eq!(status, 400);
    assert_eq!(body["errors"][0]["extensions"]["code"].as_str(), Some("INVALID_URL"));
}

#[tokio::test]
async fn disable_mocking_subgraph_surfaces_unavailable_instead_of_mocking() {
    let h = harness::build(true, PRODUCT_SDL);
    h.register(
        "products",
        // Nothing is listening here, so the live probe this triggers fails and the
        // subgraph is ineligible for passthrough.
        Some("http://127.0.0.1:9/graphql".to_string()),
        SubgraphConfig {
            disable_mocking: true,
            ..Default::default()
        },
        subgraph_proxy::schema_cache::SchemaSource::ApolloRegistry,
    )
    .await;

    let (status, _headers, body) = h
        .send(
            "http://127.0.0.1:9/graphql",
            Some("products"),
            &harness::graphql_body("{ product { id name } }"),
        )
        .await;

    assert_eq!(status, 503);
    assert_eq!(body["errors"][0]["extensions"]["code"].as_str(), Some("SUBGRAPH_UNAVAILABLE"));
}

#[tokio::test]
async fn force_mock_subgraph_never_passes_through() {
    let h = harness::build(true, PRODUCT_SDL);
    h.register(
        "products",
        Some("http://127.0.0.1:9/graphql".to_string()),
        SubgraphConfig {
            force_mock: true,
            ..Default::default()
        },
        subgraph_proxy::schema_cache::SchemaSource::ApolloRegistry,
    )
    .await;

    assert!(h.health.get_state("products").unwrap().is_mocking);

    let (status, headers, body) = h
        .send("http://127.0.0.1:9/graphql", Some("products"), &harness::graphql_body("{ product { id name } }"))
        .await;

    assert_eq!(status, 200);
    assert_eq!(headers.get("x-proxy-mode").unwrap(), "mock");
    assert!(body["data"]["product"]["id"].is_string());
}
