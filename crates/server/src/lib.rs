//! HTTP API server for digital-evidence custody.
//!
//! This crate provides the HTTP surface:
//! - Case and evidence management
//! - Streaming evidence upload and download
//! - Evidence comments
//! - User accounts and token issuance
//! - The access gate in front of every non-public route

pub mod auth;
pub mod bootstrap;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod json;
pub mod metrics;
pub mod routes;
pub mod state;

pub use auth::{AuthPayload, TraceId};
pub use coordinator::Coordinator;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
