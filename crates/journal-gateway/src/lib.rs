//! Client-side API gateway for the trading journal backend.
//!
//! All outbound calls go through [`ApiClient`], which resolves the API root
//! for the deployment environment, attaches the stored bearer credential,
//! and announces on [`SessionEvents`] when the backend rejects it.
//!
//! ```no_run
//! use std::sync::Arc;
//! use journal_gateway::{ApiClient, GatewayConfig, KeyringStore, SessionEvents};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let events = SessionEvents::new();
//! let client = ApiClient::new(
//!     GatewayConfig::from_env()?,
//!     Arc::new(KeyringStore::new()),
//!     events.clone(),
//! )?;
//! let accounts: serde_json::Value = client.get_json("/accounts").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;

pub use api::{ApiClient, ApiClientBuilder, ApiError, ApiRequest, ApiResponse};
pub use auth::{
    CredentialStore, FileStore, KeyringStore, MemoryStore, SessionEvent, SessionEvents,
    StorageError,
};
pub use config::{base_url, init_base_url, resolve_base_url, Environment, GatewayConfig, Settings};
