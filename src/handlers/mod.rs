//! Read-only HTTP handlers over the monitor state.

pub mod health_handlers;
pub mod status_handlers;
