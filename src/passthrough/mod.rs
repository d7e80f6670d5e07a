//! Passthrough Engine (§4.5): forwards a request body to a healthy subgraph and relays
//! its response, with header hygiene, bounded timeout, and introspection-cache fallback
//! on connection-class failure.
use std::time::Duration;

use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::Bytes;
use hyper::{HeaderMap, Response, StatusCode, header::HeaderName};
use serde_json_bytes::json;
use tracing::{error, warn};

use crate::error::{ProxyError, ProxyResult};
use crate::mock::is_introspection_query;
use crate::schema_cache::SchemaCache;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
const MAX_REDIRECTS: usize = 5;

const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const CONNECTION_SPECIFIC_HEADERS: &[&str] = &["host", "content-length", "content-encoding"];

type ByteResponse = Response<BoxBody<Bytes, hyper::Error>>;

pub struct PassthroughEngine {
    client: reqwest::Client,
}

impl Default for PassthroughEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PassthroughEngine {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
                .build()
                .expect("reqwest client configuration is valid"),
        }
    }

    /// Forwards `body` to `target_url`, relaying the upstream response or falling back to
    /// the introspection cache on a connection-class failure (§4.5).
    pub async fn forward(
        &self,
        subgraph_name: &str,
        target_url: &str,
        incoming_headers: &HeaderMap,
        body: &[u8],
        schema_cache: &SchemaCache,
    ) -> ProxyResult<ByteResponse> {
        let mut outbound_headers = sanitize_headers(incoming_headers);
        if !outbound_headers.contains_key(hyper::header::CONTENT_TYPE) {
            outbound_headers.insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("application/json"),
            );
        }

        let send = self
            .client
            .post(target_url)
            .headers(outbound_headers)
            .body(body.to_vec())
            .send();

        match tokio::time::timeout(DEFAULT_TIMEOUT, send).await {
            Ok(Ok(response)) => Ok(relay_response(response, target_url).await?),
            Ok(Err(err)) => {
                self.handle_failure(subgraph_name, target_url, body, &err, schema_cache).await
            }
            Err(_) => {
                warn!(%target_url, "passthrough request timed out");
                self.fall_back_to_cache(
                    subgraph_name,
                    body,
                    schema_cache,
                    ProxyError::GatewayTimeout(target_url.to_string()),
                )
                .await
            }
        }
    }

    async fn handle_failure(
        &self,
        subgraph_name: &str,
        target_url: &str,
        body: &[u8],
        err: &reqwest::Error,
        schema_cache: &SchemaCache,
    ) -> ProxyResult<ByteResponse> {
        let classified = classify_error(target_url, err);
        error!(%target_url, %err, "passthrough request failed");
        self.fall_back_to_cache(subgraph_name, body, schema_cache, classified).await
    }

    /// If the failure was connection-class and the body was an introspection query,
    /// attempts the Schema Cache before surfacing the original error.
    async fn fall_back_to_cache(
        &self,
        subgraph_name: &str,
        body: &[u8],
        schema_cache: &SchemaCache,
        original: ProxyError,
    ) -> ProxyResult<ByteResponse> {
        if !is_connection_class(&original) {
            return Err(original);
        }

        let is_introspection = std::str::from_utf8(body)
            .ok()
            .and_then(|s| serde_json_bytes::serde_json::from_str::<serde_json_bytes::serde_json::Value>(s).ok())
            .and_then(|v| v.get("query").and_then(|q| q.as_str()).map(|q| is_introspection_query(q)))
            .unwrap_or(false);

        if !is_introspection {
            return Err(original);
        }

        match schema_cache.get_schema(subgraph_name).await {
            Ok(entry) => {
                let body = json!({ "data": { "_service": { "sdl": entry.sdl.as_ref() } } });
                let bytes = serde_json_bytes::serde_json::to_vec(&body).unwrap_or_default();
                let mut resp = Response::new(
                    Full::new(Bytes::from(bytes)).map_err(|never: std::convert::Infallible| match never {}).boxed(),
                );
                *resp.status_mut() = StatusCode::OK;
                let headers = resp.headers_mut();
                headers.insert(
                    hyper::header::CONTENT_TYPE,
                    hyper::header::HeaderValue::from_static("application/json"),
                );
                headers.insert(
                    "x-proxy-mode",
                    hyper::header::HeaderValue::from_static("passthrough-introspection-cached"),
                );
                headers.insert("x-cache-fallback", hyper::header::HeaderValue::from_static("true"));
                Ok(resp)
            }
            Err(_) => Err(original),
        }
    }
}

/// "Connection-class" per §4.5: no HTTP response reached us at all (timeout, connection
/// refused/DNS, or another network-level failure before a response arrived).
fn is_connection_class(err: &ProxyError) -> bool {
    matches!(
        err,
        ProxyError::GatewayTimeout(_) | ProxyError::SubgraphUnavailable(_) | ProxyError::BadGateway(_)
    )
}

fn classify_error(target_url: &str, err: &reqwest::Error) -> ProxyError {
    if err.is_timeout() {
        ProxyError::GatewayTimeout(target_url.to_string())
    } else if err.is_connect() {
        ProxyError::SubgraphUnavailable(target_url.to_string())
    } else if err.is_body() || err.is_decode() {
        // A response did arrive; the failure happened while reading/decoding it.
        ProxyError::Internal(err.to_string())
    } else {
        ProxyError::BadGateway(err.to_string())
    }
}

fn sanitize_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in incoming.iter() {
        let lower = name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&lower.as_str()) || CONNECTION_SPECIFIC_HEADERS.contains(&lower.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

async fn relay_response(response: reqwest::Response, target_url: &str) -> ProxyResult<ByteResponse> {
    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut header_pairs = Vec::new();
    for (name, value) in response.headers().iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            hyper::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            header_pairs.push((name, value));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|err| ProxyError::BadGateway(err.to_string()))?;

    let mut resp = Response::new(Full::new(bytes).map_err(|never: std::convert::Infallible| match never {}).boxed());
    *resp.status_mut() = status;
    let headers = resp.headers_mut();
    for (name, value) in header_pairs {
        headers.append(name, value);
    }
    headers.insert("x-proxy-mode", hyper::header::HeaderValue::from_static("passthrough"));
    if let Ok(value) = hyper::header::HeaderValue::from_str(target_url) {
        headers.insert("x-proxy-target", value);
    }

    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_hop_by_hop_and_connection_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("Connection", "keep-alive".parse().unwrap());
        headers.insert("Host", "products:4001".parse().unwrap());
        headers.insert("Content-Length", "42".parse().unwrap());
        headers.insert("X-Custom", "value".parse().unwrap());

        let sanitized = sanitize_headers(&headers);
        assert!(!sanitized.contains_key("connection"));
        assert!(!sanitized.contains_key("host"));
        assert!(!sanitized.contains_key("content-length"));
        assert!(sanitized.contains_key("x-custom"));
    }

    #[test]
    fn classifies_timeout_and_connect_errors() {
        // reqwest::Error is not trivially constructible in tests without a live client, so
        // the classification matrix is exercised indirectly via the integration tests.
        assert!(is_connection_class(&ProxyError::GatewayTimeout("x".into())));
        assert!(is_connection_class(&ProxyError::SubgraphUnavailable("x".into())));
        assert!(!is_connection_class(&ProxyError::Internal("x".into())));
    }
}
