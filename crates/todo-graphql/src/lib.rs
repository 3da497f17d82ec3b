//! GraphQL resolver layer.
//!
//! Binds the GraphQL operations to the item store and the change-event
//! publisher: query resolvers read the store; mutation resolvers write the
//! store and then emit a change event through a best-effort publisher
//! boundary; subscription resolvers register with the in-process registry
//! and reshape payloads per connection.
//!
//! Two schema flavors are exposed:
//! - [`TodoSchema`] for the monolithic server, with live subscriptions
//!   backed by the in-process pub/sub registry.
//! - [`RequestSchema`] for the stateless gateway handlers, where
//!   subscriptions are handled outside the schema by the durable registry.
pub mod mutation;
pub mod query;
pub mod subscription;
pub mod types;

use async_graphql::{EmptySubscription, Schema};
use std::sync::Arc;
use todo_core::EventPublisher;
use todo_pubsub::PubSub;
use todo_store::ItemStore;

pub use mutation::MutationRoot;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;

pub type TodoSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;
pub type RequestSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Full schema for the monolithic server: queries, mutations, and live
/// subscriptions fed by `pubsub`.
pub fn build_schema(
    store: Arc<dyn ItemStore>,
    publisher: Arc<dyn EventPublisher>,
    pubsub: Arc<PubSub>,
) -> TodoSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(store)
        .data(publisher)
        .data(pubsub)
        .finish()
}

/// Request/response-only schema for the stateless transport variant. The
/// publisher still runs inside mutations; subscription traffic never reaches
/// this schema.
pub fn build_request_schema(
    store: Arc<dyn ItemStore>,
    publisher: Arc<dyn EventPublisher>,
) -> RequestSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(store)
        .data(publisher)
        .finish()
}
