//! In-memory item store.
//!
//! Exists for local development and tests: no external dependencies, not
//! durable, consistent within one process. Items are kept in insertion
//! order, which is what a small document collection returns in practice,
//! though the `ItemStore` contract deliberately guarantees no ordering.
use crate::{ItemStore, StoreResult};
use async_trait::async_trait;
use std::sync::Arc;
use todo_core::{Item, ItemId, ItemPatch};
use tokio::sync::RwLock;

#[derive(Debug, Default, Clone)]
pub struct MemoryItemStore {
    // Vec keeps insertion order; the collection is small in dev usage.
    items: Arc<RwLock<Vec<Item>>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn list(&self) -> StoreResult<Vec<Item>> {
        Ok(self.items.read().await.clone())
    }

    async fn get(&self, id: ItemId) -> StoreResult<Option<Item>> {
        let guard = self.items.read().await;
        Ok(guard.iter().find(|item| item.id == id).cloned())
    }

    async fn insert(&self, name: String) -> StoreResult<Item> {
        let item = Item::new(name);
        self.items.write().await.push(item.clone());
        Ok(item)
    }

    async fn update(&self, id: ItemId, patch: ItemPatch) -> StoreResult<Option<Item>> {
        let mut guard = self.items.write().await;
        let Some(stored) = guard.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        let previous = stored.clone();
        patch.apply_to(stored);
        Ok(Some(previous))
    }

    async fn delete(&self, id: ItemId) -> StoreResult<bool> {
        let mut guard = self.items.write().await;
        let before = guard.len();
        guard.retain(|item| item.id != id);
        Ok(guard.len() < before)
    }
}
