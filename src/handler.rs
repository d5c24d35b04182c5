//! # Request Dispatch
//!
//! Every route of the mock server is a resource handler wrapped by [`wrap_handle`].
//! The wrapper owns everything HTTP-shaped:
//!
//! 1. log the request
//! 2. authenticate the caller with basic credentials (when enabled)
//! 3. extract path parameters, query parameters and the body into an [`ApiRequest`]
//! 4. call the handler
//! 5. render `Ok(None)` as an empty 200, `Ok(Some(v))` as JSON, and `Err(e)` as the
//!    JSON error body `{"type": "ApiError", "message": ...}` with `e.status`
//!
//! Handlers never touch the response. They have the shape
//!
//! ```text
//! async fn(Option<User>, Arc<Logic>, ApiRequest) -> HandlerResult<T>
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::{ApiError, Logic, User};

/// Value of the `type` field of every error body.
pub const API_ERROR_TYPE: &str = "ApiError";

/// Body sent when an error body cannot be encoded.
pub const FALLBACK_ERROR_BODY: &str = r#"{"message":"failed to marshal an APIError"}"#;
/// Body sent when authentication fails for a reason other than bad credentials.
pub const FALLBACK_AUTH_BODY: &str = r#"{"message":"failed to authenticate"}"#;
/// Body sent when a success value cannot be encoded.
pub const FALLBACK_INTERNAL_BODY: &str = r#"{"message":"500 Internal Server Error"}"#;

/// What a resource handler produces: an optional body or an error with a status.
pub type HandlerResult<T> = Result<Option<T>, ApiError>;

/// Boxed future returned by wrapped handlers.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// The JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Always [`API_ERROR_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// The error message.
    pub message: String,
}

impl ApiErrorBody {
    /// Creates an error body carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            kind: API_ERROR_TYPE.to_string(),
            message: message.into(),
        }
    }
}

//////////////////////////////////////////////// ApiRequest ////////////////////////////////////////////////

/// The parts of an HTTP request a resource handler may look at.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Request method.
    pub method: Method,
    /// Request path.
    pub path: String,
    params: HashMap<String, String>,
    query: HashMap<String, String>,
    /// Raw request body.
    pub body: Bytes,
}

impl ApiRequest {
    /// Creates a request with no parameters and an empty body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: HashMap::new(),
            query: HashMap::new(),
            body: Bytes::new(),
        }
    }

    /// Sets a path parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Sets a query parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// A path parameter, or `""` when the route has no such parameter.
    pub fn param(&self, name: &str) -> &str {
        self.params.get(name).map(String::as_str).unwrap_or_default()
    }

    /// A raw query parameter.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// A query parameter parsed as `T`, or `default` when absent.
    ///
    /// An unparsable value is a 400.
    pub fn query_parse<T: FromStr>(&self, name: &str, default: T) -> Result<T, ApiError> {
        match self.query(name) {
            None | Some("") => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::bad_request(format!("invalid query parameter {}: {}", name, raw))),
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for ApiRequest
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = req.into_parts();
        let params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, state)
            .await
        {
            Ok(Path(params)) => params,
            Err(_) => HashMap::new(),
        };
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();
        let body = Bytes::from_request(Request::from_parts(parts, body), state)
            .await
            .map_err(|_| ApiError::bad_request("failed to read request body"))?;
        Ok(Self {
            method,
            path,
            params,
            query,
            body,
        })
    }
}

///////////////////////////////////////////////// Wrapper /////////////////////////////////////////////////

/// Turns a resource handler into an axum handler over `State<Arc<Logic>>`.
pub fn wrap_handle<F, Fut, T>(
    handler: F,
) -> impl Fn(State<Arc<Logic>>, Request) -> ResponseFuture + Clone + Send + Sync + 'static
where
    F: Fn(Option<User>, Arc<Logic>, ApiRequest) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<T>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    move |State(lgc): State<Arc<Logic>>, request: Request| -> ResponseFuture {
        let handler = handler.clone();
        Box::pin(dispatch(handler, lgc, request))
    }
}

async fn dispatch<F, Fut, T>(handler: F, lgc: Arc<Logic>, request: Request) -> Response
where
    F: Fn(Option<User>, Arc<Logic>, ApiRequest) -> Fut,
    Fut: Future<Output = HandlerResult<T>>,
    T: Serialize,
{
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    tracing::info!(path = %path, method = %method, "request start");

    let user = if lgc.auth_enabled() {
        let Some((name, password)) = basic_auth(request.headers()) else {
            tracing::warn!(path = %path, method = %method, "request basic authentication header is not set");
            return json_response(StatusCode::UNAUTHORIZED, Vec::new());
        };
        match lgc.authenticate(&name, &password) {
            Ok(user) => {
                tracing::info!(path = %path, method = %method, user_name = %user.username, "request user name");
                Some(user)
            }
            Err(e) if e.status == StatusCode::UNAUTHORIZED => {
                tracing::info!(path = %path, method = %method, user_name = %name, "authentication failed");
                return json_response(StatusCode::UNAUTHORIZED, Vec::new());
            }
            Err(e) => {
                tracing::error!(path = %path, method = %method, error = %e, "failed to authenticate");
                return error_response(&e, FALLBACK_AUTH_BODY);
            }
        }
    } else {
        None
    };

    let req = match ApiRequest::from_request(request, &()).await {
        Ok(req) => req,
        Err(e) => return error_response(&e, FALLBACK_ERROR_BODY),
    };

    match handler(user, lgc, req).await {
        Ok(None) => {
            tracing::info!(path = %path, method = %method, status = 200, "request end");
            json_response(StatusCode::OK, Vec::new())
        }
        Ok(Some(value)) => match serde_json::to_vec(&value) {
            Ok(body) => {
                tracing::info!(path = %path, method = %method, status = 200, "request end");
                json_response(StatusCode::OK, body)
            }
            Err(e) => {
                tracing::error!(path = %path, method = %method, error = %e, "failed to encode response body");
                json_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    FALLBACK_INTERNAL_BODY.as_bytes().to_vec(),
                )
            }
        },
        Err(e) => {
            tracing::info!(
                path = %path,
                method = %method,
                status = e.status.as_u16(),
                message = %e.message,
                "request error"
            );
            error_response(&e, FALLBACK_ERROR_BODY)
        }
    }
}

/// Answers requests that match no route.
pub async fn handle_not_found(request: Request) -> Response {
    tracing::info!(path = %request.uri().path(), method = %request.method(), "no route");
    error_response(
        &ApiError::not_found(format!("{} not found", request.uri().path())),
        FALLBACK_ERROR_BODY,
    )
}

/// Decodes `Authorization: Basic <base64(name:password)>`.
pub fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, password) = decoded.split_once(':')?;
    Some((name.to_string(), password.to_string()))
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

fn error_response(e: &ApiError, fallback: &str) -> Response {
    match serde_json::to_vec(&ApiErrorBody::new(e.message.clone())) {
        Ok(body) => json_response(e.status, body),
        Err(_) => json_response(e.status, fallback.as_bytes().to_vec()),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error_response(&self, FALLBACK_ERROR_BODY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn basic_auth_decodes_credentials() {
        let encoded = STANDARD.encode("admin:pass:word");
        let headers = headers_with(&format!("Basic {}", encoded));
        assert_eq!(
            basic_auth(&headers),
            Some(("admin".to_string(), "pass:word".to_string()))
        );
    }

    #[test]
    fn basic_auth_rejects_other_schemes_and_garbage() {
        assert_eq!(basic_auth(&HeaderMap::new()), None);
        assert_eq!(basic_auth(&headers_with("Bearer abc")), None);
        assert_eq!(basic_auth(&headers_with("Basic !!!")), None);
        let no_colon = STANDARD.encode("admin");
        assert_eq!(basic_auth(&headers_with(&format!("Basic {}", no_colon))), None);
    }

    #[test]
    fn query_parse_defaults_and_errors() {
        let req = ApiRequest::new(Method::GET, "/x")
            .with_query("stats", "true")
            .with_query("limit", "ten");
        assert!(req.query_parse("stats", false).unwrap());
        assert_eq!(req.query_parse("skip", 3usize).unwrap(), 3);
        assert_eq!(
            req.query_parse("limit", 0usize).unwrap_err().status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn missing_params_are_empty() {
        let req = ApiRequest::new(Method::GET, "/x").with_param("id", "abc");
        assert_eq!(req.param("id"), "abc");
        assert_eq!(req.param("other"), "");
    }

    #[test]
    fn error_body_shape() {
        let body = serde_json::to_value(ApiErrorBody::new("boom")).unwrap();
        assert_eq!(body, serde_json::json!({"type": "ApiError", "message": "boom"}));
    }
}
