//! Stateless gateway library crate.
//!
//! The gateway serves queries and mutations over plain HTTP and carries
//! subscriptions through the durable registry: socket events are handled
//! statelessly, registrations live in the registry store, and mutations fan
//! out through the durable publisher.
pub mod app;
pub mod config;
pub mod observability;
