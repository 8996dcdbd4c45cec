//! Service coordination: wiring, background tasks, graceful shutdown

pub mod app;

pub use app::{AppState, ServiceError};
