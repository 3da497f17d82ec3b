//! Stateless socket lifecycle handler.
//!
//! Every websocket event arrives here as a standalone call carrying only the
//! connection id; all session state lives in the registry store. That makes
//! the handler equally at home behind a long-lived socket task or a
//! per-event serverless invocation.
use crate::protocol::{
    self, ClientMessage, ServerMessage, CLOSE_BAD_REQUEST, CLOSE_SUBSCRIBER_EXISTS,
    CLOSE_UNAUTHORIZED,
};
use crate::push::ConnectionPush;
use crate::store::{epoch_now, ConnectionRecord, RegistryStore, SubscriptionRecord};
use crate::RegistryResult;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum SocketEvent {
    Connect,
    Message(String),
    Disconnect,
}

/// What the transport should do with the connection after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketDisposition {
    Continue,
    Close { code: u16, reason: String },
}

impl SocketDisposition {
    fn close(code: u16, reason: impl Into<String>) -> Self {
        SocketDisposition::Close {
            code,
            reason: reason.into(),
        }
    }
}

pub struct SocketHandler {
    store: Arc<dyn RegistryStore>,
    push: Arc<dyn ConnectionPush>,
    /// TTL stamped on connection and subscription records.
    ttl_secs: u64,
}

impl SocketHandler {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        push: Arc<dyn ConnectionPush>,
        ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            push,
            ttl_secs,
        }
    }

    pub async fn handle(
        &self,
        connection_id: &str,
        event: SocketEvent,
    ) -> RegistryResult<SocketDisposition> {
        match event {
            SocketEvent::Connect => {
                self.store
                    .put_connection(ConnectionRecord::new(connection_id, self.ttl_secs))
                    .await?;
                tracing::debug!(connection_id, "connection registered");
                Ok(SocketDisposition::Continue)
            }
            SocketEvent::Disconnect => {
                let removed = self
                    .store
                    .delete_connection_subscriptions(connection_id)
                    .await?;
                self.store.delete_connection(connection_id).await?;
                tracing::debug!(connection_id, removed, "connection cleaned up");
                Ok(SocketDisposition::Continue)
            }
            SocketEvent::Message(text) => self.handle_message(connection_id, &text).await,
        }
    }

    async fn handle_message(
        &self,
        connection_id: &str,
        text: &str,
    ) -> RegistryResult<SocketDisposition> {
        let message = match protocol::parse_client_message(text) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(connection_id, error = %err, "unparseable frame");
                return Ok(SocketDisposition::close(CLOSE_BAD_REQUEST, err.to_string()));
            }
        };

        match message {
            ClientMessage::ConnectionInit { .. } => {
                // Upsert rather than require an existing record: the connect
                // event and the first frame can race in stateless deployments.
                // An existing record keeps its connect timestamp; the ack
                // only flips the flag and refreshes the TTL.
                let mut record = self
                    .store
                    .get_connection(connection_id)
                    .await?
                    .unwrap_or_else(|| ConnectionRecord::new(connection_id, self.ttl_secs));
                record.acked = true;
                record.expires_at = epoch_now() + self.ttl_secs;
                self.store.put_connection(record).await?;
                self.send(connection_id, ServerMessage::ConnectionAck).await;
                Ok(SocketDisposition::Continue)
            }
            ClientMessage::Subscribe { id, payload } => {
                let acked = self
                    .store
                    .get_connection(connection_id)
                    .await?
                    .map(|record| record.acked)
                    .unwrap_or(false);
                if !acked {
                    return Ok(SocketDisposition::close(CLOSE_UNAUTHORIZED, "unauthorized"));
                }
                let duplicate = self
                    .store
                    .subscriptions_for_connection(connection_id)
                    .await?
                    .iter()
                    .any(|record| record.operation_id == id);
                if duplicate {
                    return Ok(SocketDisposition::close(
                        CLOSE_SUBSCRIBER_EXISTS,
                        format!("subscriber already exists: {id}"),
                    ));
                }

                match protocol::parse_subscription(
                    &payload.query,
                    payload.operation_name.as_deref(),
                ) {
                    Ok((topic, fields)) => {
                        let record = SubscriptionRecord::new(
                            topic,
                            connection_id,
                            id.clone(),
                            fields,
                            self.ttl_secs,
                        );
                        self.store.put_subscription(record).await?;
                        tracing::debug!(connection_id, operation = %id, topic = %topic, "subscribed");
                        Ok(SocketDisposition::Continue)
                    }
                    Err(err) => {
                        // Operation-scoped error; the connection survives.
                        self.send(
                            connection_id,
                            ServerMessage::operation_error(id, err.to_string()),
                        )
                        .await;
                        Ok(SocketDisposition::Continue)
                    }
                }
            }
            ClientMessage::Complete { id } => {
                let registered = self
                    .store
                    .subscriptions_for_connection(connection_id)
                    .await?;
                for record in registered
                    .into_iter()
                    .filter(|record| record.operation_id == id)
                {
                    self.store
                        .delete_subscription(record.topic, &record.subscription_id)
                        .await?;
                }
                Ok(SocketDisposition::Continue)
            }
            ClientMessage::Ping { .. } => {
                self.send(connection_id, ServerMessage::Pong).await;
                Ok(SocketDisposition::Continue)
            }
            ClientMessage::Pong { .. } => Ok(SocketDisposition::Continue),
        }
    }

    /// Push failures mean the socket went away under us; the disconnect
    /// event will clean up, so they are logged and swallowed here.
    async fn send(&self, connection_id: &str, message: ServerMessage) {
        if let Err(err) = self.push.push(connection_id, message.to_json()).await {
            tracing::warn!(connection_id, error = %err, "push failed");
        }
    }
}
