//! The two standard pipeline stages.

use std::sync::Arc;

use reqwest::header::{self, HeaderValue};
use tracing::warn;

use crate::auth::{current_credential, CredentialStore, SessionEvents};

use super::pipeline::{ApiRequest, ApiResponse, RequestInterceptor, ResponseInterceptor};
use super::ApiError;

/// Attaches `Authorization: Bearer <credential>` when a credential is stored.
///
/// Requests without a stored credential go out untouched. A storage failure
/// rejects the request instead of sending it unauthenticated.
#[derive(Clone)]
pub struct BearerAuth {
    store: Arc<dyn CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

impl RequestInterceptor for BearerAuth {
    fn on_request(&self, mut request: ApiRequest) -> Result<ApiRequest, ApiError> {
        if let Some(token) = current_credential(self.store.as_ref())? {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|_| {
                ApiError::InvalidRequest("Stored credential is not a valid header value".into())
            })?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Broadcasts `SessionEvent::Invalidated` when the backend answers 401.
/// The outcome itself is always passed on unchanged.
#[derive(Debug, Clone)]
pub struct SessionGuard {
    events: SessionEvents,
}

impl SessionGuard {
    pub fn new(events: SessionEvents) -> Self {
        Self { events }
    }
}

impl ResponseInterceptor for SessionGuard {
    fn on_response(
        &self,
        outcome: Result<ApiResponse, ApiError>,
    ) -> Result<ApiResponse, ApiError> {
        if let Err(ref err) = outcome {
            if err.is_unauthorized() {
                let reached = self.events.notify_invalidated();
                warn!(listeners = reached, "Backend rejected credential, session invalidated");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryStore, StorageError, ACCESS_TOKEN_KEY, LEGACY_TOKEN_KEY};
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    struct BrokenStore;

    impl CredentialStore for BrokenStore {
        fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("locked".into()))
        }

        fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("locked".into()))
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("locked".into()))
        }
    }

    fn auth_header(request: &ApiRequest) -> Option<&str> {
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_bearer_from_primary_key() {
        let store = Arc::new(MemoryStore::new());
        store.write(ACCESS_TOKEN_KEY, "abc123").unwrap();

        let request = BearerAuth::new(store).on_request(ApiRequest::get("/accounts")).unwrap();
        assert_eq!(auth_header(&request), Some("Bearer abc123"));
    }

    #[test]
    fn test_bearer_from_legacy_key() {
        let store = Arc::new(MemoryStore::new());
        store.write(LEGACY_TOKEN_KEY, "legacy").unwrap();

        let request = BearerAuth::new(store).on_request(ApiRequest::get("/accounts")).unwrap();
        assert_eq!(auth_header(&request), Some("Bearer legacy"));
    }

    #[test]
    fn test_no_credential_leaves_request_alone() {
        let request = BearerAuth::new(Arc::new(MemoryStore::new()))
            .on_request(ApiRequest::get("/accounts"))
            .unwrap();
        assert_eq!(auth_header(&request), None);
    }

    #[test]
    fn test_storage_failure_rejects_request() {
        let result = BearerAuth::new(Arc::new(BrokenStore)).on_request(ApiRequest::get("/accounts"));
        assert!(matches!(result, Err(ApiError::Storage(StorageError::Unavailable(_)))));
    }

    #[test]
    fn test_unprintable_credential_rejects_request() {
        let store = Arc::new(MemoryStore::new());
        store.write(ACCESS_TOKEN_KEY, "bad\ntoken").unwrap();

        let result = BearerAuth::new(store).on_request(ApiRequest::get("/accounts"));
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_guard_signals_on_401_only() {
        let events = SessionEvents::new();
        let mut receiver = events.subscribe();
        let guard = SessionGuard::new(events);

        let ok = guard.on_response(Ok(ApiResponse::new(StatusCode::OK, HeaderMap::new(), vec![])));
        assert!(ok.is_ok());

        let forbidden = guard.on_response(Err(ApiError::from_status(StatusCode::FORBIDDEN, "")));
        assert!(matches!(forbidden, Err(ApiError::AccessDenied(_))));
        let server = guard.on_response(Err(ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "")));
        assert!(server.is_err());
        assert!(receiver.try_recv().is_err());

        let unauthorized = guard.on_response(Err(ApiError::Unauthorized));
        assert!(matches!(unauthorized, Err(ApiError::Unauthorized)));
        assert!(receiver.try_recv().is_ok());
        assert!(receiver.try_recv().is_err());
    }
}
