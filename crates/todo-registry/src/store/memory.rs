//! In-memory registry backend.
//!
//! Used by the local harness and by tests. Reads page through matches in
//! deterministic key order so paging behavior stays observable without a
//! real table behind it.
use super::{epoch_now, ConnectionRecord, RegistryStore, SubscriptionRecord};
use crate::RegistryResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use todo_core::Topic;

const DEFAULT_PAGE_SIZE: usize = 100;

pub struct MemoryRegistry {
    connections: RwLock<HashMap<String, ConnectionRecord>>,
    subscriptions: RwLock<HashMap<String, SubscriptionRecord>>,
    page_size: usize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Smaller pages are useful in tests that want to see multi-page reads.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    /// Read matching live records in page-sized rounds, carrying the last
    /// key as the cursor like the table-backed store does. Each round takes
    /// the lock fresh, so writes between rounds are observed the same way a
    /// paged table query would observe them.
    fn live_subscriptions<F>(&self, matches: F) -> Vec<SubscriptionRecord>
    where
        F: Fn(&SubscriptionRecord) -> bool,
    {
        let now = epoch_now();
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let guard = self.subscriptions.read();
            let mut page: Vec<&SubscriptionRecord> = guard
                .values()
                .filter(|record| !record.is_expired(now) && matches(record))
                .filter(|record| {
                    cursor
                        .as_deref()
                        .map_or(true, |last| record.subscription_id.as_str() > last)
                })
                .collect();
            page.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
            page.truncate(self.page_size);
            let exhausted = page.len() < self.page_size;
            cursor = page.last().map(|record| record.subscription_id.clone());
            out.extend(page.into_iter().cloned());
            if exhausted {
                break;
            }
        }
        out
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RegistryStore for MemoryRegistry {
    async fn put_connection(&self, record: ConnectionRecord) -> RegistryResult<()> {
        self.connections
            .write()
            .insert(record.connection_id.clone(), record);
        Ok(())
    }

    async fn get_connection(
        &self,
        connection_id: &str,
    ) -> RegistryResult<Option<ConnectionRecord>> {
        let now = epoch_now();
        Ok(self
            .connections
            .read()
            .get(connection_id)
            .filter(|record| !record.is_expired(now))
            .cloned())
    }

    async fn delete_connection(&self, connection_id: &str) -> RegistryResult<()> {
        self.connections.write().remove(connection_id);
        Ok(())
    }

    async fn put_subscription(&self, record: SubscriptionRecord) -> RegistryResult<()> {
        self.subscriptions
            .write()
            .insert(record.subscription_id.clone(), record);
        Ok(())
    }

    async fn delete_subscription(
        &self,
        _topic: Topic,
        subscription_id: &str,
    ) -> RegistryResult<()> {
        self.subscriptions.write().remove(subscription_id);
        Ok(())
    }

    async fn subscriptions_for_topic(
        &self,
        topic: Topic,
    ) -> RegistryResult<Vec<SubscriptionRecord>> {
        Ok(self.live_subscriptions(|record| record.topic == topic))
    }

    async fn subscriptions_for_connection(
        &self,
        connection_id: &str,
    ) -> RegistryResult<Vec<SubscriptionRecord>> {
        Ok(self.live_subscriptions(|record| record.connection_id == connection_id))
    }

    async fn delete_connection_subscriptions(&self, connection_id: &str) -> RegistryResult<usize> {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|_, record| record.connection_id != connection_id);
        Ok(before - subscriptions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(topic: Topic, connection: &str, operation: &str) -> SubscriptionRecord {
        SubscriptionRecord::new(topic, connection, operation, vec!["id".into()], 3600)
    }

    #[tokio::test]
    async fn connection_round_trip_and_delete() {
        let registry = MemoryRegistry::new();
        registry
            .put_connection(ConnectionRecord::new("c1", 3600))
            .await
            .expect("put");

        let found = registry.get_connection("c1").await.expect("get");
        assert_eq!(found.expect("present").connection_id, "c1");

        registry.delete_connection("c1").await.expect("delete");
        assert!(registry.get_connection("c1").await.expect("get").is_none());
        // Double delete is fine.
        registry.delete_connection("c1").await.expect("redelete");
    }

    #[tokio::test]
    async fn expired_connection_reads_as_absent() {
        let registry = MemoryRegistry::new();
        registry
            .put_connection(ConnectionRecord::new("stale", 0))
            .await
            .expect("put");
        assert!(registry
            .get_connection("stale")
            .await
            .expect("get")
            .is_none());
    }

    #[tokio::test]
    async fn topic_query_spans_pages_and_skips_expired() {
        let registry = MemoryRegistry::with_page_size(2);
        for n in 0..5 {
            registry
                .put_subscription(sub(Topic::ItemCreated, "c1", &format!("op-{n}")))
                .await
                .expect("put");
        }
        registry
            .put_subscription(sub(Topic::ItemUpdated, "c1", "other-topic"))
            .await
            .expect("put");
        registry
            .put_subscription(SubscriptionRecord::new(
                Topic::ItemCreated,
                "c2",
                "expired",
                vec![],
                0,
            ))
            .await
            .expect("put");

        let found = registry
            .subscriptions_for_topic(Topic::ItemCreated)
            .await
            .expect("query");
        assert_eq!(found.len(), 5);
        assert!(found.iter().all(|record| record.topic == Topic::ItemCreated));
        // Three rounds of two must neither duplicate nor drop a record.
        let mut ids: Vec<&str> = found
            .iter()
            .map(|record| record.subscription_id.as_str())
            .collect();
        ids.dedup();
        assert_eq!(ids.len(), 5);
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted, "cursor pages must come back in key order");
    }

    #[tokio::test]
    async fn page_boundary_on_an_exact_multiple_terminates() {
        let registry = MemoryRegistry::with_page_size(2);
        for n in 0..4 {
            registry
                .put_subscription(sub(Topic::ItemRemoved, "c1", &format!("op-{n}")))
                .await
                .expect("put");
        }
        let found = registry
            .subscriptions_for_topic(Topic::ItemRemoved)
            .await
            .expect("query");
        assert_eq!(found.len(), 4);
    }

    #[tokio::test]
    async fn disconnect_cleanup_removes_only_that_connection() {
        let registry = MemoryRegistry::new();
        registry
            .put_subscription(sub(Topic::ItemCreated, "c1", "op-1"))
            .await
            .expect("put");
        registry
            .put_subscription(sub(Topic::ItemRemoved, "c1", "op-2"))
            .await
            .expect("put");
        registry
            .put_subscription(sub(Topic::ItemCreated, "c2", "op-1"))
            .await
            .expect("put");

        let removed = registry
            .delete_connection_subscriptions("c1")
            .await
            .expect("cleanup");
        assert_eq!(removed, 2);

        let remaining = registry
            .subscriptions_for_topic(Topic::ItemCreated)
            .await
            .expect("query");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].connection_id, "c2");
    }

    #[tokio::test]
    async fn delete_subscription_targets_one_operation() {
        let registry = MemoryRegistry::new();
        registry
            .put_subscription(sub(Topic::ItemCreated, "c1", "op-1"))
            .await
            .expect("put");
        registry
            .put_subscription(sub(Topic::ItemCreated, "c1", "op-2"))
            .await
            .expect("put");

        registry
            .delete_subscription(Topic::ItemCreated, "c1:op-1")
            .await
            .expect("delete");

        let remaining = registry
            .subscriptions_for_connection("c1")
            .await
            .expect("query");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].operation_id, "op-2");
    }
}
