//! Axum-based local status server.
//!
//! Exposes the state of the running client for supervisors and scrapers.
//! Disabled unless `server.enabled` is set.
//!
//! # Components
//!
//! - `handlers`: `/health` (channel and session state) and `/metrics`.
//! - `routes`: router configuration and shared state.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod routes;

pub use handlers::{HealthCheck, HealthResponse, HealthStatus};
pub use routes::{create_router, AppState};
