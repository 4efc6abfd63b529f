//! JSON HTTP API Adapter
//!
//! Exposes the trade engine and portfolio valuator over axum 0.7.
//! Callers identify themselves with the `x-user-id` header.
//!
//! Sub-modules:
//! - `server`: Router, handlers and error-to-status mapping
//! - `types`: Request/response type definitions

pub mod server;
pub mod types;

pub use server::{router, serve, ApiError, ApiState, USER_HEADER};
