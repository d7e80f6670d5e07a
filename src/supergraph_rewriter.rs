//! Auxiliary helper (§2, not on the hot request path): rewrites a router's
//! supergraph-config YAML so each subgraph's `routing_url` points at this proxy, encoding
//! the original URL into the `/:encodedUrl` path convention of §6. Grounded in the
//! teacher's YAML-mapping traversal in `lib.rs::merge_yaml`.
use anyhow::{Context, Result, anyhow};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde_yaml::Value;

/// Rewrites every subgraph's `routing_url` in `supergraph_config_yaml` to
/// `{proxy_base_url}/{percent-encoded original routing_url}`, leaving every other key
/// (schema source, introspection headers, etc.) untouched.
pub fn rewrite_routing_urls(supergraph_config_yaml: &str, proxy_base_url: &str) -> Result<String> {
    let mut doc: Value =
        serde_yaml::from_str(supergraph_config_yaml).context("parsing supergraph config yaml")?;

    let subgraphs = doc
        .get_mut("subgraphs")
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| anyhow!("supergraph config has no 'subgraphs' mapping"))?;

    let base = proxy_base_url.trim_end_matches('/');

    for (name, entry) in subgraphs.iter_mut() {
        let mapping = entry
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("subgraph '{:?}' entry is not a mapping", name))?;

        let original_url = mapping
            .get("routing_url")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("subgraph '{:?}' has no routing_url", name))?
            .to_string();

        let encoded = utf8_percent_encode(&original_url, NON_ALPHANUMERIC).to_string();
        mapping.insert(
            Value::String("routing_url".to_string()),
            Value::String(format!("{base}/{encoded}")),
        );
    }

    serde_yaml::to_string(&doc).context("serializing rewritten supergraph config")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
federation_version: =2.6.0
subgraphs:
  products:
    routing_url: http://products:4001/graphql
    schema:
      file: ./products.graphql
  reviews:
    routing_url: http://reviews:4002/graphql
    schema:
      file: ./reviews.graphql
";

    #[test]
    fn rewrites_every_subgraph_routing_url() {
        let rewritten = rewrite_routing_urls(SAMPLE, "http://proxy:4000").unwrap();
        let doc: Value = serde_yaml::from_str(&rewritten).unwrap();

        let products_url = doc["subgraphs"]["products"]["routing_url"].as_str().unwrap();
        assert!(products_url.starts_with("http://proxy:4000/"));
        assert!(products_url.contains("products%3A4001"));

        let reviews_url = doc["subgraphs"]["reviews"]["routing_url"].as_str().unwrap();
        assert!(reviews_url.starts_with("http://proxy:4000/"));
    }

    #[test]
    fn preserves_non_routing_url_keys() {
        let rewritten = rewrite_routing_urls(SAMPLE, "http://proxy:4000").unwrap();
        let doc: Value = serde_yaml::from_str(&rewritten).unwrap();
        assert_eq!(
            doc["subgraphs"]["products"]["schema"]["file"].as_str(),
            Some("./products.graphql")
        );
        assert_eq!(doc["federation_version"].as_str(), Some("=2.6.0"));
    }

    #[test]
    fn trims_trailing_slash_on_base_url() {
        let rewritten = rewrite_routing_urls(SAMPLE, "http://proxy:4000/").unwrap();
        let doc: Value = serde_yaml::from_str(&rewritten).unwrap();
        let url = doc["subgraphs"]["products"]["routing_url"].as_str().unwrap();
        assert!(!url.starts_with("http://proxy:4000//"));
    }

    #[test]
    fn missing_subgraphs_key_is_an_error() {
        let result = rewrite_routing_urls("federation_version: =2.6.0\n", "http://proxy:4000");
        assert!(result.is_err());
    }
}
