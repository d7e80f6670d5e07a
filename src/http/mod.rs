//! HTTP surface (§6): the six endpoints the proxy exposes, wired onto one
//! hyper service function. Request bodies are read eagerly and dispatched to
//! `AppState::router` for the GraphQL proxy path; the rest are small,
//! synchronous status reports over in-memory state.
use std::error::Error;
use std::sync::Arc;

use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use serde_json_bytes::json;
use tracing::warn;

use crate::app::AppState;
use crate::health::Status;
use crate::router::decode_request;

pub type BoxedBody = BoxBody<Bytes, hyper::Error>;
pub type ByteResponse = Response<BoxedBody>;

const SERVICE_NAME: &str = "subgraph-proxy";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

fn json_response(status: StatusCode, body: serde_json_bytes::Value) -> ByteResponse {
    let bytes = serde_json_bytes::serde_json::to_vec(&body).unwrap_or_default();
    let mut resp = Response::new(
        Full::new(Bytes::from(bytes))
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed(),
    );
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    resp
}

fn not_found() -> ByteResponse {
    json_response(
        StatusCode::NOT_FOUND,
        json!({ "errors": [{ "message": "not found", "extensions": { "code": "NOT_FOUND" } }], "data": null }),
    )
}

/// Top-level hyper service entry point, analogous to the teacher's `handle_request`.
pub async fn handle_request<B>(req: Request<B>, state: Arc<AppState>) -> anyhow::Result<ByteResponse>
where
    B: Body,
    B::Error: Error + Send + Sync + 'static,
{
    let (parts, body) = req.into_parts();
    let (method, path) = (parts.method, parts.uri.path().to_string());

    if method == Method::GET {
        match path.as_str() {
            "/" => return Ok(root(&state)),
            "/live" => return Ok(live(&state)),
            "/ready" => return Ok(ready(&state)),
            "/health" => return Ok(health(&state)),
            "/status" => return Ok(status(&state)),
            _ => return Ok(not_found()),
        }
    }

    if method == Method::POST && path.len() > 1 {
        let encoded = path.trim_start_matches('/');
        let body_bytes = body.collect().await?.to_bytes().to_vec();
        return Ok(match decode_request(parts.headers, encoded, &body_bytes) {
            Ok(decoded) => state.router.handle(decoded, &body_bytes).await,
            Err(err) => err.into_response(),
        });
    }

    warn!(%method, %path, "received unexpected request");
    Ok(not_found())
}

fn root(state: &AppState) -> ByteResponse {
    json_response(
        StatusCode::OK,
        json!({
            "service": SERVICE_NAME,
            "status": "running",
            "version": SERVICE_VERSION,
            "timestamp": state.started_at.to_rfc3339(),
        }),
    )
}

fn live(state: &AppState) -> ByteResponse {
    json_response(
        StatusCode::OK,
        json!({
            "status": "alive",
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime": state.uptime_seconds(),
        }),
    )
}

fn ready(state: &AppState) -> ByteResponse {
    if state.is_shutting_down() {
        json_response(StatusCode::SERVICE_UNAVAILABLE, json!({ "status": "not_ready" }))
    } else {
        json_response(StatusCode::OK, json!({ "status": "ready" }))
    }
}

/// Reports one `checks` entry per registered subgraph, since the Health Monitor is the
/// only component with an ongoing liveness signal to report (§6).
fn health(state: &AppState) -> ByteResponse {
    let states = state.health.get_all_states();
    let mut checks = serde_json_bytes::Map::new();
    let mut worst_is_unhealthy = false;
    let mut worst_is_degraded = false;

    for (name, s) in &states {
        let (component_status, message) = match s.status {
            Status::Available => ("healthy", "probe succeeded"),
            Status::Mocking => ("degraded", "serving mock responses"),
            Status::Unknown => ("degraded", "not yet probed"),
            Status::Unavailable => ("unhealthy", "probe failing"),
        };
        match component_status {
            "unhealthy" => worst_is_unhealthy = true,
            "degraded" => worst_is_degraded = true,
            _ => {}
        }

        checks.insert(
            serde_json_bytes::ByteString::from(name.clone()),
            json!({
                "status": component_status,
                "message": message,
                "lastCheck": s.last_health_check.map(|t| t.to_rfc3339()),
                "metrics": { "consecutiveFailures": s.consecutive_failures },
            }),
        );
    }

    let overall = if worst_is_unhealthy {
        "unhealthy"
    } else if worst_is_degraded {
        "degraded"
    } else {
        "healthy"
    };

    let code = if overall == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    json_response(
        code,
        json!({
            "status": overall,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "uptime": state.uptime_seconds(),
            "checks": serde_json_bytes::Value::Object(checks),
        }),
    )
}

fn status(state: &AppState) -> ByteResponse {
    let states = state.health.get_all_states();
    let total = states.len();
    let healthy = states.values().filter(|s| s.is_healthy).count();
    let mocking = states.values().filter(|s| s.is_mocking).count();

    let subgraphs: Vec<_> = states
        .iter()
        .map(|(name, s)| {
            json!({
                "name": name,
                "url": s.url,
                "status": format!("{:?}", s.status).to_lowercase(),
                "isHealthy": s.is_healthy,
                "isMocking": s.is_mocking,
                "schemaSource": serde_json_bytes::serde_json::to_value(s.schema_source)
                    .unwrap_or(serde_json_bytes::serde_json::Value::Null),
                "lastCheck": s.last_health_check.map(|t| t.to_rfc3339()),
                "consecutiveFailures": s.consecutive_failures,
            })
        })
        .collect();

    json_response(
        StatusCode::OK,
        json!({
            "totalSubgraphs": total,
            "healthySubgraphs": healthy,
            "mockingSubgraphs": mocking,
            "subgraphs": subgraphs,
        }),
    )
}
