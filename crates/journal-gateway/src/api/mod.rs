//! HTTP client layer for the trading journal backend.
//!
//! Every outbound call goes through `ApiClient`, which runs an explicit
//! pipeline of interceptors around the transport:
//! - request stages run in order before the call is sent
//!   (`BearerAuth` attaches the stored credential),
//! - response stages run in order on the outcome
//!   (`SessionGuard` broadcasts a session-invalid event on 401).
//!
//! Requests are issued relative to the resolved API root (`/api`).

pub mod client;
pub mod error;
pub mod interceptors;
pub mod pipeline;

pub use client::{ApiClient, ApiClientBuilder};
pub use error::ApiError;
pub use interceptors::{BearerAuth, SessionGuard};
pub use pipeline::{ApiRequest, ApiResponse, Pipeline, RequestInterceptor, ResponseInterceptor};
