//! Request/response values and the interceptor pipeline they flow through.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};

use crate::config::REQUEST_TIMEOUT_MS;

use super::ApiError;

/// One outgoing call, before it is turned into a transport request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    timeout: Duration,
    // Resolve `path` against the origin instead of the API root
    origin_relative: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
            origin_relative: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to serialize body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Address `path` from the origin rather than the API root, for the few
    /// backend routes served outside `/api`.
    pub fn outside_api_root(mut self) -> Self {
        self.origin_relative = true;
        self
    }

    pub fn is_origin_relative(&self) -> bool {
        self.origin_relative
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A fully-read backend response with a success status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        Self { status, headers, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON: {}", e)))
    }
}

/// Stage run on every request before it is sent. An `Err` rejects the
/// request and nothing goes over the wire.
pub trait RequestInterceptor: Send + Sync {
    fn on_request(&self, request: ApiRequest) -> Result<ApiRequest, ApiError>;
}

/// Stage run on every outcome, success or failure, before it reaches the
/// caller.
pub trait ResponseInterceptor: Send + Sync {
    fn on_response(
        &self,
        outcome: Result<ApiResponse, ApiError>,
    ) -> Result<ApiResponse, ApiError>;
}

impl<F> RequestInterceptor for F
where
    F: Fn(ApiRequest) -> Result<ApiRequest, ApiError> + Send + Sync,
{
    fn on_request(&self, request: ApiRequest) -> Result<ApiRequest, ApiError> {
        self(request)
    }
}

impl<F> ResponseInterceptor for F
where
    F: Fn(Result<ApiResponse, ApiError>) -> Result<ApiResponse, ApiError> + Send + Sync,
{
    fn on_response(
        &self,
        outcome: Result<ApiResponse, ApiError>,
    ) -> Result<ApiResponse, ApiError> {
        self(outcome)
    }
}

/// Ordered interceptor chain, fixed when the client is built.
#[derive(Clone, Default)]
pub struct Pipeline {
    request: Vec<Arc<dyn RequestInterceptor>>,
    response: Vec<Arc<dyn ResponseInterceptor>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request<I: RequestInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.request.push(Arc::new(interceptor));
        self
    }

    pub fn with_response<I: ResponseInterceptor + 'static>(mut self, interceptor: I) -> Self {
        self.response.push(Arc::new(interceptor));
        self
    }

    /// Run request stages in registration order, stopping at the first error.
    pub fn prepare(&self, request: ApiRequest) -> Result<ApiRequest, ApiError> {
        self.request
            .iter()
            .try_fold(request, |request, stage| stage.on_request(request))
    }

    /// Run response stages in registration order. Every stage sees the
    /// outcome, including failures.
    pub fn complete(
        &self,
        outcome: Result<ApiResponse, ApiError>,
    ) -> Result<ApiResponse, ApiError> {
        self.response
            .iter()
            .fold(outcome, |outcome, stage| stage.on_response(outcome))
    }
}

// A nested pipeline acts as a single stage of its parent.
impl RequestInterceptor for Pipeline {
    fn on_request(&self, request: ApiRequest) -> Result<ApiRequest, ApiError> {
        self.prepare(request)
    }
}

impl ResponseInterceptor for Pipeline {
    fn on_response(
        &self,
        outcome: Result<ApiResponse, ApiError>,
    ) -> Result<ApiResponse, ApiError> {
        self.complete(outcome)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("request_stages", &self.request.len())
            .field("response_stages", &self.response.len())
            .finish()
    }
}
