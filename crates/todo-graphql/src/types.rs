// GraphQL-facing projections of the core types.
use async_graphql::{SimpleObject, ID};

/// A todo item as exposed over the API.
#[derive(SimpleObject, Debug, Clone)]
pub struct Item {
    pub id: ID,
    pub name: String,
    pub done: bool,
}

impl From<todo_core::Item> for Item {
    fn from(item: todo_core::Item) -> Self {
        Self {
            id: ID(item.id.to_string()),
            name: item.name,
            done: item.done,
        }
    }
}
