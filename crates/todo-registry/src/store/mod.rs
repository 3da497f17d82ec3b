//! Registry records and the storage trait behind them.
//!
//! Both tables are TTL'd: every record carries an `expires_at` epoch-seconds
//! stamp, and backends treat expired records as absent even before the
//! store's own reaper removes them.

pub mod dynamo;
pub mod memory;

use crate::RegistryResult;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use todo_core::Topic;

pub use dynamo::{DynamoRegistry, RegistryTables};
pub use memory::MemoryRegistry;

/// Seconds since the Unix epoch, saturating at zero on a pre-epoch clock.
pub fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// One live websocket connection.
///
/// `acked` flips when the client completes the `connection_init` handshake;
/// subscribe frames arriving before that are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: String,
    pub acked: bool,
    pub connected_at: u64,
    pub expires_at: u64,
}

impl ConnectionRecord {
    pub fn new(connection_id: impl Into<String>, ttl_secs: u64) -> Self {
        let now = epoch_now();
        Self {
            connection_id: connection_id.into(),
            acked: false,
            connected_at: now,
            expires_at: now + ttl_secs,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// One active subscription operation on a connection.
///
/// `subscription_id` is `"{connection_id}:{operation_id}"`, unique per
/// (connection, operation) pair. `fields` is the client's selection set on
/// the subscription field, kept so fan-out can project payloads down to what
/// was asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    pub topic: Topic,
    pub connection_id: String,
    pub operation_id: String,
    pub fields: Vec<String>,
    pub expires_at: u64,
}

impl SubscriptionRecord {
    pub fn new(
        topic: Topic,
        connection_id: impl Into<String>,
        operation_id: impl Into<String>,
        fields: Vec<String>,
        ttl_secs: u64,
    ) -> Self {
        let connection_id = connection_id.into();
        let operation_id = operation_id.into();
        Self {
            subscription_id: format!("{connection_id}:{operation_id}"),
            topic,
            connection_id,
            operation_id,
            fields,
            expires_at: epoch_now() + ttl_secs,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now
    }
}

/// Keyed, TTL'd storage for connections and subscriptions.
///
/// Writes are upserts. Reads never return expired records. Deletes of
/// absent keys succeed silently; disconnect cleanup must be idempotent
/// because transports can fire it more than once.
#[async_trait::async_trait]
pub trait RegistryStore: Send + Sync {
    async fn put_connection(&self, record: ConnectionRecord) -> RegistryResult<()>;

    async fn get_connection(&self, connection_id: &str)
        -> RegistryResult<Option<ConnectionRecord>>;

    async fn delete_connection(&self, connection_id: &str) -> RegistryResult<()>;

    async fn put_subscription(&self, record: SubscriptionRecord) -> RegistryResult<()>;

    async fn delete_subscription(&self, topic: Topic, subscription_id: &str)
        -> RegistryResult<()>;

    /// Every live subscription on a topic, across however many pages the
    /// backend needs to serve it.
    async fn subscriptions_for_topic(&self, topic: Topic)
        -> RegistryResult<Vec<SubscriptionRecord>>;

    async fn subscriptions_for_connection(
        &self,
        connection_id: &str,
    ) -> RegistryResult<Vec<SubscriptionRecord>>;

    /// Remove every subscription a connection holds. Returns how many were
    /// removed.
    async fn delete_connection_subscriptions(&self, connection_id: &str) -> RegistryResult<usize>;
}
