//! Permalog admin API
//!
//! HTTP surface for operating the publisher: a public health endpoint,
//! plus bearer-secret-protected endpoints to trigger a processing tick
//! and to exercise the bundle and verification paths with synthetic
//! data.

pub mod auth;
pub mod dto;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{run_server, start_background_server};
pub use state::{ApiConfig, AppState};
