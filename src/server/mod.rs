//! Axum front end of the adapter.
//!
//! The harness points its model endpoint at this server. `/health` and
//! `/metrics` are answered locally; every other path is handed to the
//! adapter pipeline.
//!
//! - `handlers`: health, metrics and the catch-all proxy handler.
//! - `middleware`: request ID tracking.
//! - `routes`: router assembly.
//!
//! Author: kelexine (<https://github.com/kelexine>)

mod handlers;
mod middleware;
mod routes;

pub use handlers::HealthResponse;
pub use routes::{create_router, AppState};
