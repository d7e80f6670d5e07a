//! Crate-wide error type. Every fallible core operation returns `Result<_, ProxyError>`;
//! request-time errors are mapped to the HTTP error envelope by [`ProxyError::into_response`].
use http_body_util::{BodyExt, Full, combinators::BoxBody};
use hyper::{Response, StatusCode, body::Bytes};
use serde_json_bytes::json;

pub type BoxedBody = BoxBody<Bytes, hyper::Error>;
pub type ByteResponse = Response<BoxedBody>;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid target url: {0}")]
    InvalidUrl(String),

    #[error("invalid graphql request: {0}")]
    InvalidGraphqlRequest(String),

    #[error("missing query")]
    MissingQuery,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("no schema cached for subgraph '{0}'")]
    SchemaNotFound(String),

    #[error("subgraph '{0}' is unavailable")]
    SubgraphUnavailable(String),

    #[error("failed to fetch schema for '{subgraph}': {message}")]
    SchemaFetchFailed { subgraph: String, message: String },

    #[error("graphql parse error: {0}")]
    GraphqlParseError(String),

    #[error("graphql validation error: {0}")]
    GraphqlValidationError(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("mock generation error: {0}")]
    MockGenerationError(String),

    #[error("passthrough failed: {0}")]
    PassthroughFailed(String),

    #[error("gateway timeout contacting '{0}'")]
    GatewayTimeout(String),

    #[error("bad gateway: {0}")]
    BadGateway(String),

    #[error("internal server error: {0}")]
    Internal(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ProxyError {
    /// Stable machine-readable code, used in `extensions.code` of the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "INVALID_URL",
            Self::InvalidGraphqlRequest(_) => "INVALID_GRAPHQL_REQUEST",
            Self::MissingQuery => "MISSING_QUERY",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::SchemaNotFound(_) => "SCHEMA_NOT_FOUND",
            Self::SubgraphUnavailable(_) => "SUBGRAPH_UNAVAILABLE",
            Self::SchemaFetchFailed { .. } => "SCHEMA_FETCH_FAILED",
            Self::GraphqlParseError(_) => "GRAPHQL_PARSE_ERROR",
            Self::GraphqlValidationError(_) => "GRAPHQL_VALIDATION_ERROR",
            Self::SchemaError(_) => "SCHEMA_ERROR",
            Self::MockGenerationError(_) => "MOCK_GENERATION_ERROR",
            Self::PassthroughFailed(_) => "PASSTHROUGH_FAILED",
            Self::GatewayTimeout(_) => "GATEWAY_TIMEOUT",
            Self::BadGateway(_) => "BAD_GATEWAY",
            Self::Internal(_) => "INTERNAL_SERVER_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidUrl(_)
            | Self::InvalidGraphqlRequest(_)
            | Self::MissingQuery
            | Self::BadRequest(_)
            | Self::GraphqlParseError(_)
            | Self::GraphqlValidationError(_) => StatusCode::BAD_REQUEST,
            Self::SchemaNotFound(_) => StatusCode::NOT_FOUND,
            Self::SubgraphUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::SchemaFetchFailed { .. } | Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::SchemaError(_)
            | Self::MockGenerationError(_)
            | Self::PassthroughFailed(_)
            | Self::Internal(_)
            | Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Renders the single top-level error envelope: `{errors: [{message, extensions: {code}}], data: null}`.
    pub fn into_response(self) -> ByteResponse {
        let status = self.status();
        let body = json!({
            "errors": [{
                "message": self.to_string(),
                "extensions": { "code": self.code() },
            }],
            "data": null,
        });

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
}

pub type ProxyResult<T> = Result<T, ProxyError>;
