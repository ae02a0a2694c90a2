//! ChatCast Storage - Database access layer
//!
//! This crate provides the PostgreSQL storage layer for ChatCast:
//! connection pooling, models, and per-aggregate repositories.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
