//! Durable fan-out: deliver a change event to every registered subscriber.
//!
//! Nothing is buffered. Each event reads the topic's registrations once,
//! shapes a payload per subscriber from its stored selection set, and pushes
//! a `next` frame. A failed push is that subscriber's problem alone; the
//! loop carries on.
use crate::protocol::ServerMessage;
use crate::push::ConnectionPush;
use crate::store::RegistryStore;
use metrics::counter;
use std::sync::Arc;
use todo_core::{ChangeEvent, EventPublisher};

pub struct DurablePublisher {
    store: Arc<dyn RegistryStore>,
    push: Arc<dyn ConnectionPush>,
}

impl DurablePublisher {
    pub fn new(store: Arc<dyn RegistryStore>, push: Arc<dyn ConnectionPush>) -> Self {
        Self { store, push }
    }

    async fn fan_out(&self, event: &ChangeEvent) -> usize {
        let topic = event.topic();
        let registered = match self.store.subscriptions_for_topic(topic).await {
            Ok(registered) => registered,
            Err(err) => {
                tracing::error!(topic = %topic, error = %err, "registry read failed");
                return 0;
            }
        };

        let payload = event.payload_json();
        let mut delivered = 0;
        for record in registered {
            let shaped = project_fields(&payload, &record.fields);
            let frame = ServerMessage::Next {
                id: record.operation_id.clone(),
                payload: serde_json::json!({ "data": { topic.field_name(): shaped } }),
            };
            match self
                .push
                .push(&record.connection_id, frame.to_json())
                .await
            {
                Ok(()) => delivered += 1,
                Err(err) => {
                    counter!("todo_registry_push_failed_total", "topic" => topic.as_str())
                        .increment(1);
                    tracing::debug!(
                        connection_id = %record.connection_id,
                        error = %err,
                        "push to stale connection failed"
                    );
                }
            }
        }
        counter!("todo_registry_fanout_total", "topic" => topic.as_str())
            .increment(delivered as u64);
        delivered
    }
}

#[async_trait::async_trait]
impl EventPublisher for DurablePublisher {
    async fn publish(&self, event: ChangeEvent) {
        self.fan_out(&event).await;
    }
}

/// Keep only the keys a subscriber selected. An empty selection and
/// non-object payloads (removal events carry a bare id) pass through whole.
fn project_fields(payload: &serde_json::Value, fields: &[String]) -> serde_json::Value {
    let Some(object) = payload.as_object() else {
        return payload.clone();
    };
    if fields.is_empty() {
        return payload.clone();
    }
    let projected = fields
        .iter()
        .filter_map(|field| {
            object
                .get(field)
                .map(|value| (field.clone(), value.clone()))
        })
        .collect();
    serde_json::Value::Object(projected)
}
