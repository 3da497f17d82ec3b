use crate::types::Item;
use async_graphql::{Context, Object, Result, ID};
use std::str::FromStr;
use std::sync::Arc;
use todo_core::ItemId;
use todo_store::ItemStore;

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// All items, in store-defined order.
    async fn items(&self, ctx: &Context<'_>) -> Result<Vec<Item>> {
        let store = ctx.data::<Arc<dyn ItemStore>>()?;
        let items = store.list().await?;
        Ok(items.into_iter().map(Item::from).collect())
    }

    /// A single item by id. A missing id is a null result, not an error.
    async fn item(&self, ctx: &Context<'_>, id: ID) -> Result<Option<Item>> {
        let store = ctx.data::<Arc<dyn ItemStore>>()?;
        let id = ItemId::from_str(id.as_str())?;
        Ok(store.get(id).await?.map(Item::from))
    }
}
