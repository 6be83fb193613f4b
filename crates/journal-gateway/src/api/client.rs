//! API client for the trading journal backend.
//!
//! `ApiClient` owns the transport and the interceptor pipeline. Every public
//! call funnels through `ApiClient::request`, so credential injection and
//! session checks apply uniformly.

use std::sync::Arc;

use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::auth::{CredentialStore, SessionEvents};
use crate::config::GatewayConfig;

use super::interceptors::{BearerAuth, SessionGuard};
use super::pipeline::{ApiRequest, ApiResponse, Pipeline, RequestInterceptor, ResponseInterceptor};
use super::ApiError;

/// Health check path, served at the origin root outside `/api`
const HEALTH_PATH: &str = "/health";

/// API client for the journal backend.
/// Clone is cheap - reqwest::Client and the pipeline are shared.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
    config: Arc<GatewayConfig>,
    pipeline: Pipeline,
}

/// Composes the interceptor pipeline. Credential injection runs before any
/// extra request stage, and the session guard before any extra response
/// stage.
pub struct ApiClientBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn CredentialStore>>,
    events: Option<SessionEvents>,
    request_stages: Pipeline,
    response_stages: Pipeline,
}

impl ApiClientBuilder {
    /// Read credentials from `store` on every request.
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Broadcast session invalidation on `events`.
    pub fn session_events(mut self, events: SessionEvents) -> Self {
        self.events = Some(events);
        self
    }

    pub fn request_stage<I: RequestInterceptor + 'static>(mut self, stage: I) -> Self {
        self.request_stages = self.request_stages.with_request(stage);
        self
    }

    pub fn response_stage<I: ResponseInterceptor + 'static>(mut self, stage: I) -> Self {
        self.response_stages = self.response_stages.with_response(stage);
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let client = Client::builder()
            .timeout(self.config.timeout())
            .default_headers(self.config.default_headers().clone())
            .build()?;

        let mut pipeline = Pipeline::new();
        if let Some(store) = self.store {
            pipeline = pipeline.with_request(BearerAuth::new(store));
        }
        pipeline = pipeline.with_request(self.request_stages);
        if let Some(events) = self.events {
            pipeline = pipeline.with_response(SessionGuard::new(events));
        }
        pipeline = pipeline.with_response(self.response_stages);

        Ok(ApiClient {
            client,
            config: Arc::new(self.config),
            pipeline,
        })
    }
}

impl ApiClient {
    pub fn builder(config: GatewayConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            store: None,
            events: None,
            request_stages: Pipeline::new(),
            response_stages: Pipeline::new(),
        }
    }

    /// Client with the standard pipeline: bearer credential from `store`,
    /// session invalidation on `events`.
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn CredentialStore>,
        events: SessionEvents,
    ) -> Result<Self, ApiError> {
        Self::builder(config)
            .credentials(store)
            .session_events(events)
            .build()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run `request` through the pipeline and the transport.
    ///
    /// Response stages observe every outcome, including requests rejected
    /// before they were sent.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let request = request.with_timeout(self.config.timeout());
        let outcome = match self.pipeline.prepare(request) {
            Ok(request) => self.send(request).await,
            Err(e) => Err(e),
        };
        self.pipeline.complete(outcome)
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = if request.is_origin_relative() {
            self.config.origin_endpoint(request.path())
        } else {
            self.config.endpoint(request.path())
        };
        debug!(
            method = %request.method(),
            url = %url,
            authenticated = request.headers().contains_key(header::AUTHORIZATION),
            "Sending request"
        );

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone())
            .timeout(request.timeout());
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        Self::check_response(response).await
    }

    /// Read a successful response fully, or turn a failure status into an
    /// error carrying the body.
    async fn check_response(response: reqwest::Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        if status.is_success() {
            let headers = response.headers().clone();
            let body = response.bytes().await?;
            Ok(ApiResponse::new(status, headers, body.to_vec()))
        } else {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(status = %status, error = %e, "Failed to read error response body");
                    String::new()
                }
            };
            Err(ApiError::from_status(status, &body))
        }
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse, ApiError> {
        self.request(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(ApiRequest::delete(path)).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path).await?.json()
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.post(path, body).await?.json()
    }

    /// Check the backend's health endpoint. Goes through the pipeline like
    /// any other call.
    pub async fn health(&self) -> Result<ApiResponse, ApiError> {
        self.request(ApiRequest::get(HEALTH_PATH).outside_api_root()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStore, StorageError};
    use crate::config::Environment;

    struct LockedStore;

    impl CredentialStore for LockedStore {
        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("keychain locked".into()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Ok(())
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn config() -> GatewayConfig {
        // Nothing listens on port 9 (discard), and the request must never
        // reach it in these tests anyway
        GatewayConfig::new(Environment::Development, "http://127.0.0.1:9").unwrap()
    }

    #[tokio::test]
    async fn test_storage_failure_never_sends() {
        let client = ApiClient::new(config(), Arc::new(LockedStore), SessionEvents::new()).unwrap();
        let err = client.get("/accounts").await.unwrap_err();
        assert!(matches!(err, ApiError::Storage(_)));
    }

    #[tokio::test]
    async fn test_rejected_request_still_reaches_response_stages() {
        let events = SessionEvents::new();
        let mut receiver = events.subscribe();
        let client = ApiClient::builder(config())
            .credentials(Arc::new(MemoryStore::new()))
            .session_events(events)
            .request_stage(|_: ApiRequest| -> Result<ApiRequest, ApiError> {
                Err(ApiError::Unauthorized)
            })
            .build()
            .unwrap();

        let err = client.get("/accounts").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(receiver.try_recv().is_ok());
    }

    #[test]
    fn test_client_exposes_config() {
        let client = ApiClient::builder(config()).build().unwrap();
        assert_eq!(client.config().base_url(), "/api");
        assert!(std::ptr::eq(client.config().base_url(), crate::config::base_url()));
        assert_eq!(client.config().timeout().as_millis(), 10_000);
    }
}
