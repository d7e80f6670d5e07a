//! Request Router (§4.1): decodes an inbound proxy request, classifies it as
//! introspection/mock/passthrough, and dispatches to the matching engine.
use std::sync::Arc;

use http_body_util::BodyExt as _;
use hyper::{HeaderMap, Response, StatusCode};
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Deserialize;
use serde_json_bytes::json;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

use crate::error::{BoxedBody, ProxyError, ProxyResult};
use crate::health::HealthMonitor;
use crate::mock::MockEngine;
use crate::mock::resolvers::ResolverMap;
use crate::passthrough::PassthroughEngine;
use crate::schema_cache::SchemaCache;

type ByteResponse = Response<BoxedBody>;

static HOSTNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)*$").unwrap()
});

#[derive(Debug, Deserialize, Default)]
pub struct GraphqlRequestBody {
    pub query: String,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: serde_json_bytes::Map<serde_json_bytes::ByteString, serde_json_bytes::Value>,
}

/// The decoded, validated shape of one inbound proxy request (§3 "Request" supplement).
pub struct DecodedRequest {
    pub headers: HeaderMap,
    pub body: GraphqlRequestBody,
    pub target_url: Url,
    pub subgraph_name: String,
}

/// Percent-decodes the path segment exactly once and validates it as an absolute
/// `http`/`https` URL with an allowed host shape (§4.1).
pub fn decode_target_url(encoded_segment: &str) -> ProxyResult<Url> {
    let decoded = percent_decode_str(encoded_segment)
        .decode_utf8()
        .map_err(|_| ProxyError::InvalidUrl("path segment is not valid UTF-8".to_string()))?;

    let url = Url::parse(&decoded).map_err(|_| ProxyError::InvalidUrl(decoded.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ProxyError::InvalidUrl(format!("unsupported scheme '{}'", url.scheme())));
    }

    let host = url
        .host_str()
        .ok_or_else(|| ProxyError::InvalidUrl("missing host".to_string()))?;

    if host != "localhost" && host.parse::<std::net::Ipv4Addr>().is_err() && !HOSTNAME_PATTERN.is_match(host) {
        return Err(ProxyError::InvalidUrl(format!("invalid host '{host}'")));
    }

    Ok(url)
}

pub fn decode_request(headers: HeaderMap, encoded_segment: &str, body_bytes: &[u8]) -> ProxyResult<DecodedRequest> {
    let target_url = decode_target_url(encoded_segment)?;

    let subgraph_name = headers
        .get("x-subgraph-name")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProxyError::InvalidGraphqlRequest("missing or empty x-subgraph-name header".to_string()))?
        .to_string();

    let body: GraphqlRequestBody = serde_json_bytes::serde_json::from_slice(body_bytes)
        .map_err(|err| ProxyError::InvalidGraphqlRequest(err.to_string()))?;

    if body.query.trim().is_empty() {
        return Err(ProxyError::MissingQuery);
    }

    Ok(DecodedRequest {
        headers,
        body,
        target_url,
        subgraph_name,
    })
}

pub struct Router {
    health: Arc<HealthMonitor>,
    schema_cache: Arc<SchemaCache>,
    mock_engine: Arc<MockEngine>,
    passthrough_engine: Arc<PassthroughEngine>,
    passthrough_enabled: bool,
}

impl Router {
    pub fn new(
        health: Arc<HealthMonitor>,
        schema_cache: Arc<SchemaCache>,
        mock_engine: Arc<MockEngine>,
        passthrough_engine: Arc<PassthroughEngine>,
        passthrough_enabled: bool,
    ) -> Self {
        Self {
            health,
            schema_cache,
            mock_engine,
            passthrough_engine,
            passthrough_enabled,
        }
    }

    /// Implements the routing decision of §4.1 steps 1-6 and dispatches to the matching
    /// engine, or produces the error envelope directly for decode/classification failures.
    pub async fn handle(&self, req: DecodedRequest, raw_body: &[u8]) -> ByteResponse {
        match self.route(&req, raw_body).await {
            Ok(resp) => resp,
            Err(err) => err.into_response(),
        }
    }

    async fn route(&self, req: &DecodedRequest, raw_body: &[u8]) -> ProxyResult<ByteResponse> {
        let target_str = req.target_url.as_str();

        // §4.1 step 1: resolve by registered name first, then by URL match. An
        // unresolvable name is not rejected outright here — it falls through to the mock
        // path below, where the Schema Cache's lookup miss surfaces as SCHEMA_NOT_FOUND.
        let name = match self.health.get_state(&req.subgraph_name) {
            Some(_) => req.subgraph_name.clone(),
            None => self.health.find_by_url(target_str).unwrap_or_else(|| {
                warn!(subgraph = %req.subgraph_name, url = %target_str, "unknown subgraph");
                req.subgraph_name.clone()
            }),
        };

        let state = self.health.get_state(&name);
        let eligible_for_passthrough = self.passthrough_enabled && state.as_ref().is_some_and(|s| !s.is_mocking);

        let should_passthrough = eligible_for_passthrough
            && (state.as_ref().is_some_and(|s| s.is_healthy)
                || self.health.check_health(&name).await.is_ok_and(|o| o == crate::health::ProbeOutcome::Healthy));

        debug!(subgraph = %name, should_passthrough, "routing decision made");

        if should_passthrough {
            let mut resp = self
                .passthrough_engine
                .forward(&name, target_str, &req.headers, raw_body, &self.schema_cache)
                .await?;
            resp.headers_mut()
                .insert("x-proxy-target", hyper::header::HeaderValue::from_str(target_str).unwrap());
            return Ok(resp);
        }

        // disableMocking means "never mock, surface errors on failure" (§3, §7): a subgraph
        // that isn't eligible for passthrough here must fail loudly rather than fall back to
        // a fabricated mock response. forceMock always wins, per the §4.2 tie-break order.
        if let Some(state) = &state
            && state.config.disable_mocking
            && !state.config.force_mock
        {
            return Err(ProxyError::SubgraphUnavailable(name));
        }

        let entry = self
            .schema_cache
            .get_schema(&name)
            .await
            .map_err(|err| ProxyError::SchemaNotFound(format!("{name}: {err}")))?;

        let overrides: Option<&ResolverMap> = None;
        let is_introspection = crate::mock::is_introspection_query(&req.body.query);

        let value = self
            .mock_engine
            .handle(&name, &entry, &req.body.query, req.body.operation_name.as_deref(), overrides)
            .await?;

        let bytes = serde_json_bytes::serde_json::to_vec(&value).unwrap_or_default();
        let mut resp = Response::new(
            http_body_util::Full::new(hyper::body::Bytes::from(bytes))
                .map_err(|never: std::convert::Infallible| match never {})
                .boxed(),
        );
        *resp.status_mut() = StatusCode::OK;
        let headers = resp.headers_mut();
        headers.insert(hyper::header::CONTENT_TYPE, hyper::header::HeaderValue::from_static("application/json"));
        headers.insert(
            "x-proxy-mode",
            hyper::header::HeaderValue::from_static(if is_introspection { "mock-introspection" } else { "mock" }),
        );
        headers.insert("x-mock-response", hyper::header::HeaderValue::from_static("true"));
        if let Ok(value) = hyper::header::HeaderValue::from_str(&name) {
            headers.insert("x-mock-subgraph", value);
        }

        Ok(resp)
    }
}
