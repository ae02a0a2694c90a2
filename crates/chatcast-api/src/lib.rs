//! HTTP API for the campaign delivery pipeline.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;

pub use auth::AppState;
pub use routes::create_router;
