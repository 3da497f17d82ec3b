//! Monolithic todo service library crate.
//!
//! Exposes the router, config, and observability pieces so the binary and
//! the integration tests share one construction path.
pub mod app;
pub mod config;
pub mod observability;
