//! Router construction.
//!
//! One endpoint carries the whole API: GET serves the GraphiQL page, POST
//! executes queries and mutations, and `/graphql/ws` upgrades to the
//! graphql-transport-ws subprotocol for subscriptions.
use crate::config::{ServerConfig, StoreBackend};
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQL, GraphQLSubscription};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use todo_core::EventPublisher;
use todo_graphql::{build_schema, TodoSchema};
use todo_pubsub::PubSub;
use todo_store::dynamo::{DynamoConfig, DynamoItemStore};
use todo_store::memory::MemoryItemStore;
use todo_store::ItemStore;

pub async fn build_store(config: &ServerConfig) -> Arc<dyn ItemStore> {
    match config.store {
        StoreBackend::Memory => Arc::new(MemoryItemStore::new()),
        StoreBackend::DynamoDb => Arc::new(
            DynamoItemStore::connect(DynamoConfig {
                table_name: config.items_table.clone(),
                region: config.dynamo_region.clone(),
                endpoint: config.dynamo_endpoint.clone(),
            })
            .await,
        ),
    }
}

pub fn build_schema_with(store: Arc<dyn ItemStore>, pubsub: Arc<PubSub>) -> TodoSchema {
    let publisher: Arc<dyn EventPublisher> = pubsub.clone();
    build_schema(store, publisher, pubsub)
}

pub fn build_router(schema: TodoSchema) -> Router {
    Router::new()
        .route(
            "/graphql",
            get(graphiql).post_service(GraphQL::new(schema.clone())),
        )
        .route_service("/graphql/ws", GraphQLSubscription::new(schema))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn graphiql() -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint("/graphql")
            .subscription_endpoint("/graphql/ws")
            .finish(),
    )
}
