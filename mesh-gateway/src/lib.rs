//! Mesh Gateway Server Library
//!
//! This library provides the HTTP server for the Mesh Gateway system

pub mod app;
pub mod observability;
pub mod router;

// Re-export the main server function
pub use app::{create_app, start_server, AppState};
