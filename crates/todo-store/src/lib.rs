//! Persistent store adapter for todo items.
//!
//! # Purpose
//! Wraps the document database behind a typed CRUD contract for the single
//! persisted entity kind. Two backends implement the contract:
//! - `memory`: process-local, for development and tests
//! - `dynamo`: a DynamoDB document table, for durable deployments
//!
//! # Consistency
//! Every operation touches a single record and is atomic at the store level.
//! There is no multi-record transaction: a mutation commits its record first,
//! and the caller publishes the change event afterwards as a separate step.
use async_trait::async_trait;
use thiserror::Error;
use todo_core::{Item, ItemId, ItemPatch};

pub mod dynamo;
pub mod memory;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("malformed record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed record CRUD for items.
///
/// Not-found is a normal empty result for every operation: reads return
/// `None`, `update` returns `None` when no record matched, and `delete`
/// reports whether a record existed. Surfacing absence as an error (or not)
/// is the resolver layer's decision, not the store's.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// All items in store-defined order. No stable ordering is guaranteed.
    async fn list(&self) -> StoreResult<Vec<Item>>;

    async fn get(&self, id: ItemId) -> StoreResult<Option<Item>>;

    /// Durable insert with a store-generated id and `done = false`.
    async fn insert(&self, name: String) -> StoreResult<Item>;

    /// Durable partial update: only fields present in the patch change.
    /// Returns the record as stored *before* the update, or `None` if the id
    /// did not exist (in which case nothing is written).
    async fn update(&self, id: ItemId, patch: ItemPatch) -> StoreResult<Option<Item>>;

    /// Durable delete. Returns whether a record actually existed.
    async fn delete(&self, id: ItemId) -> StoreResult<bool>;
}
