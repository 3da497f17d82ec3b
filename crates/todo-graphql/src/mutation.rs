//! Mutation resolvers.
//!
//! Each mutation is an explicit two-step protocol: commit the record, then
//! emit the change event. The publisher is a best-effort boundary — it
//! cannot fail or block the mutation's own result.
use crate::types::Item;
use async_graphql::{Context, Object, Result, ID};
use std::str::FromStr;
use std::sync::Arc;
use todo_core::{ChangeEvent, EventPublisher, ItemId, ItemPatch};
use todo_store::ItemStore;

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Insert a new item with `done = false` and a store-generated id.
    async fn insert_item(&self, ctx: &Context<'_>, name: String) -> Result<Item> {
        let store = ctx.data::<Arc<dyn ItemStore>>()?;
        let publisher = ctx.data::<Arc<dyn EventPublisher>>()?;

        let item = store.insert(name).await?;
        tracing::debug!(id = %item.id, "item inserted");
        publisher.publish(ChangeEvent::Created(item.clone())).await;
        Ok(item.into())
    }

    /// Partial update: only supplied fields change. Returns true without
    /// checking that the id existed — updating a nonexistent id is accepted
    /// and still publishes, carrying the input values as the payload. The
    /// published view merges explicit inputs over the previously stored
    /// values.
    async fn update_item(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: Option<String>,
        done: Option<bool>,
    ) -> Result<bool> {
        let store = ctx.data::<Arc<dyn ItemStore>>()?;
        let publisher = ctx.data::<Arc<dyn EventPublisher>>()?;

        let item_id = ItemId::from_str(id.as_str())?;
        let patch = ItemPatch {
            name: name.clone(),
            done,
        };
        let previous = store.update(item_id, patch).await?;
        tracing::debug!(id = %item_id, existed = previous.is_some(), "item updated");

        let merged = todo_core::Item {
            id: item_id,
            name: name
                .or_else(|| previous.as_ref().map(|item| item.name.clone()))
                .unwrap_or_default(),
            done: done
                .or_else(|| previous.as_ref().map(|item| item.done))
                .unwrap_or(false),
        };
        publisher.publish(ChangeEvent::Updated(merged)).await;
        Ok(true)
    }

    /// Delete by id. Returns true unconditionally and always publishes the
    /// removal, whether or not a record existed.
    async fn delete_item(&self, ctx: &Context<'_>, id: ID) -> Result<bool> {
        let store = ctx.data::<Arc<dyn ItemStore>>()?;
        let publisher = ctx.data::<Arc<dyn EventPublisher>>()?;

        let item_id = ItemId::from_str(id.as_str())?;
        let existed = store.delete(item_id).await?;
        tracing::debug!(id = %item_id, existed, "item deleted");
        publisher.publish(ChangeEvent::Removed(item_id)).await;
        Ok(true)
    }
}
