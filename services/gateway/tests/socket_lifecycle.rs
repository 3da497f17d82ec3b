// End-to-end gateway flow against the memory backend: socket lifecycle,
// durable registration, and mutation fan-out to pushed frames.
use std::net::SocketAddr;
use todo_gateway::app::{self, GatewayState};
use todo_gateway::config::{Backend, GatewayConfig};
use todo_registry::{SocketDisposition, SocketEvent};

fn memory_config() -> GatewayConfig {
    GatewayConfig {
        http_bind: "127.0.0.1:0".parse::<SocketAddr>().expect("bind"),
        metrics_bind: "127.0.0.1:0".parse::<SocketAddr>().expect("bind"),
        backend: Backend::Memory,
        items_table: "todo-items".into(),
        connections_table: "todo-connections".into(),
        subscriptions_table: "todo-subscriptions".into(),
        dynamo_region: None,
        dynamo_endpoint: None,
        bootstrap_tables: false,
        connection_ttl_secs: 3600,
    }
}

async fn connected_state() -> GatewayState {
    app::build_state(&memory_config()).await.expect("state")
}

async fn handshake(state: &GatewayState, connection_id: &str) {
    state
        .handler
        .handle(connection_id, SocketEvent::Connect)
        .await
        .expect("connect");
    let disposition = state
        .handler
        .handle(
            connection_id,
            SocketEvent::Message(r#"{"type":"connection_init"}"#.into()),
        )
        .await
        .expect("init");
    assert_eq!(disposition, SocketDisposition::Continue);
}

async fn subscribe(state: &GatewayState, connection_id: &str, id: &str, query: &str) {
    let frame = serde_json::json!({
        "type": "subscribe",
        "id": id,
        "payload": { "query": query },
    })
    .to_string();
    let disposition = state
        .handler
        .handle(connection_id, SocketEvent::Message(frame))
        .await
        .expect("subscribe");
    assert_eq!(disposition, SocketDisposition::Continue);
}

async fn run_mutation(state: &GatewayState, query: &str) -> serde_json::Value {
    let response = state.schema.execute(query).await;
    assert!(
        response.errors.is_empty(),
        "unexpected errors: {:?}",
        response.errors
    );
    response.data.into_json().expect("json data")
}

#[tokio::test]
async fn mutation_fans_out_to_a_registered_socket() {
    let state = connected_state().await;
    let mut frames = state.push.attach("c1");
    handshake(&state, "c1").await;
    let ack = frames.recv().await.expect("ack");
    assert!(ack.contains("connection_ack"));

    subscribe(
        &state,
        "c1",
        "op-1",
        "subscription { itemCreated { name done } }",
    )
    .await;

    run_mutation(&state, r#"mutation { insertItem(name: "durable") { id } }"#).await;

    let frame: serde_json::Value =
        serde_json::from_str(&frames.recv().await.expect("next frame")).expect("json");
    assert_eq!(frame["type"], "next");
    assert_eq!(frame["id"], "op-1");
    assert_eq!(
        frame["payload"]["data"]["itemCreated"],
        serde_json::json!({ "name": "durable", "done": false })
    );
}

#[tokio::test]
async fn update_of_missing_id_still_reaches_subscribers() {
    // The mutation contract accepts unknown ids and publishes the inputs.
    let state = connected_state().await;
    let mut frames = state.push.attach("c1");
    handshake(&state, "c1").await;
    let _ack = frames.recv().await;
    subscribe(&state, "c1", "op-1", "subscription { itemUpdated { name } }").await;

    let ghost = todo_core::ItemId::new();
    let data = run_mutation(
        &state,
        &format!(r#"mutation {{ updateItem(id: "{ghost}", name: "phantom") }}"#),
    )
    .await;
    assert_eq!(data["updateItem"], true);

    let frame: serde_json::Value =
        serde_json::from_str(&frames.recv().await.expect("next frame")).expect("json");
    assert_eq!(
        frame["payload"]["data"]["itemUpdated"],
        serde_json::json!({ "name": "phantom" })
    );
}

#[tokio::test]
async fn complete_stops_the_flow() {
    let state = connected_state().await;
    let mut frames = state.push.attach("c1");
    handshake(&state, "c1").await;
    let _ack = frames.recv().await;
    subscribe(&state, "c1", "op-1", "subscription { itemCreated { name } }").await;

    state
        .handler
        .handle(
            "c1",
            SocketEvent::Message(r#"{"type":"complete","id":"op-1"}"#.into()),
        )
        .await
        .expect("complete");

    run_mutation(&state, r#"mutation { insertItem(name: "after complete") { id } }"#).await;
    assert!(frames.try_recv().is_err());
}

#[tokio::test]
async fn disconnect_stops_the_flow() {
    let state = connected_state().await;
    let mut frames = state.push.attach("c1");
    handshake(&state, "c1").await;
    let _ack = frames.recv().await;
    subscribe(&state, "c1", "op-1", "subscription { itemRemoved }").await;

    state
        .handler
        .handle("c1", SocketEvent::Disconnect)
        .await
        .expect("disconnect");
    state.push.detach("c1");

    let id = todo_core::ItemId::new();
    run_mutation(&state, &format!(r#"mutation {{ deleteItem(id: "{id}") }}"#)).await;
    assert!(frames.try_recv().is_err());
}

#[tokio::test]
async fn two_connections_each_get_their_own_frame() {
    let state = connected_state().await;
    let mut frames_a = state.push.attach("c1");
    let mut frames_b = state.push.attach("c2");
    for connection_id in ["c1", "c2"] {
        handshake(&state, connection_id).await;
        subscribe(
            &state,
            connection_id,
            "op-1",
            "subscription { itemCreated { name } }",
        )
        .await;
    }
    let _ = frames_a.recv().await;
    let _ = frames_b.recv().await;

    run_mutation(&state, r#"mutation { insertItem(name: "shared") { id } }"#).await;

    for frames in [&mut frames_a, &mut frames_b] {
        let frame = frames.recv().await.expect("frame");
        assert!(frame.contains("shared"));
    }
}

#[tokio::test]
async fn subscriptions_are_rejected_by_the_request_schema() {
    // Subscription traffic belongs to the socket path, not the HTTP schema.
    let state = connected_state().await;
    let response = state
        .schema
        .execute("subscription { itemCreated { id } }")
        .await;
    assert!(!response.errors.is_empty());
}
