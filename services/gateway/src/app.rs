//! Gateway router: a request/response GraphQL endpoint plus the durable
//! websocket transport.
//!
//! Subscriptions never execute through the schema here. The websocket task
//! assigns a connection id, forwards every socket event to the stateless
//! handler, and drains the connection's push channel back into the socket.
//! Mutations fan out to registered subscribers through the durable
//! publisher, so an event raised on one gateway instance reaches sockets
//! whose registrations it can read.
use crate::config::{Backend, GatewayConfig};
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{any, post};
use axum::Router;
use std::sync::Arc;
use todo_core::EventPublisher;
use todo_graphql::{build_request_schema, RequestSchema};
use todo_registry::store::{DynamoRegistry, MemoryRegistry, RegistryTables};
use todo_registry::{
    DurablePublisher, LocalPushChannel, RegistryStore, SocketDisposition, SocketEvent,
    SocketHandler,
};
use todo_store::dynamo::{self, DynamoConfig, DynamoItemStore};
use todo_store::memory::MemoryItemStore;
use todo_store::ItemStore;

#[derive(Clone)]
pub struct GatewayState {
    pub schema: RequestSchema,
    pub handler: Arc<SocketHandler>,
    pub push: Arc<LocalPushChannel>,
}

pub async fn build_state(config: &GatewayConfig) -> anyhow::Result<GatewayState> {
    let (store, registry): (Arc<dyn ItemStore>, Arc<dyn RegistryStore>) = match config.backend {
        Backend::Memory => (
            Arc::new(MemoryItemStore::new()),
            Arc::new(MemoryRegistry::new()),
        ),
        Backend::DynamoDb => {
            let client = dynamo::build_client(
                config.dynamo_region.clone(),
                config.dynamo_endpoint.clone(),
            )
            .await;
            let registry = DynamoRegistry::new(
                client.clone(),
                RegistryTables {
                    connections: config.connections_table.clone(),
                    subscriptions: config.subscriptions_table.clone(),
                },
            );
            if config.bootstrap_tables {
                registry.create_tables_if_missing().await?;
            }
            (
                Arc::new(DynamoItemStore::from_client(client, config.items_table.clone())),
                Arc::new(registry),
            )
        }
    };

    let push = Arc::new(LocalPushChannel::new());
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(DurablePublisher::new(registry.clone(), push.clone()));
    let handler = Arc::new(SocketHandler::new(
        registry,
        push.clone(),
        config.connection_ttl_secs,
    ));
    Ok(GatewayState {
        schema: build_request_schema(store, publisher),
        handler,
        push,
    })
}

pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/graphql/ws", any(ws_upgrade))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn graphql_handler(
    State(state): State<GatewayState>,
    request: GraphQLRequest,
) -> GraphQLResponse {
    state.schema.execute(request.into_inner()).await.into()
}

async fn ws_upgrade(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.protocols(["graphql-transport-ws"])
        .on_upgrade(move |socket| drive_socket(state, socket))
}

/// Own one socket for its lifetime: register the connection, then interleave
/// pushed frames with incoming client frames until either side ends it.
async fn drive_socket(state: GatewayState, mut socket: WebSocket) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    let mut frames = state.push.attach(&connection_id);

    if let Err(err) = state
        .handler
        .handle(&connection_id, SocketEvent::Connect)
        .await
    {
        tracing::error!(connection_id, error = %err, "connect registration failed");
        state.push.detach(&connection_id);
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        if socket.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let event = SocketEvent::Message(text.as_str().to_owned());
                        match state.handler.handle(&connection_id, event).await {
                            Ok(SocketDisposition::Continue) => {}
                            Ok(SocketDisposition::Close { code, reason }) => {
                                let _ = socket
                                    .send(Message::Close(Some(CloseFrame {
                                        code,
                                        reason: reason.into(),
                                    })))
                                    .await;
                                break;
                            }
                            Err(err) => {
                                tracing::error!(connection_id, error = %err, "socket event failed");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // axum answers ping/pong itself; binary frames are ignored.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(connection_id, error = %err, "socket read failed");
                        break;
                    }
                }
            }
        }
    }

    if let Err(err) = state
        .handler
        .handle(&connection_id, SocketEvent::Disconnect)
        .await
    {
        tracing::warn!(connection_id, error = %err, "disconnect cleanup failed");
    }
    state.push.detach(&connection_id);
}
