//! Subscription resolvers for the monolithic variant.
//!
//! Each resolver registers the calling connection against exactly one fixed
//! topic and yields a lazy, infinite sequence of payloads. The sequence
//! never completes on its own; async-graphql drops the stream on
//! unsubscribe/disconnect, which unregisters the subscriber.
use crate::types::Item;
use async_graphql::{Context, Result, Subscription, ID};
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use todo_core::{ChangeEvent, Topic};
use todo_pubsub::PubSub;

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    async fn item_created(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = Item>> {
        let pubsub = ctx.data::<Arc<PubSub>>()?;
        Ok(pubsub
            .subscribe(Topic::ItemCreated)
            .filter_map(|event| async move {
                match event {
                    ChangeEvent::Created(item) => Some(item.into()),
                    _ => None,
                }
            }))
    }

    async fn item_updated(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = Item>> {
        let pubsub = ctx.data::<Arc<PubSub>>()?;
        Ok(pubsub
            .subscribe(Topic::ItemUpdated)
            .filter_map(|event| async move {
                match event {
                    ChangeEvent::Updated(item) => Some(item.into()),
                    _ => None,
                }
            }))
    }

    async fn item_removed(&self, ctx: &Context<'_>) -> Result<impl Stream<Item = ID>> {
        let pubsub = ctx.data::<Arc<PubSub>>()?;
        Ok(pubsub
            .subscribe(Topic::ItemRemoved)
            .filter_map(|event| async move {
                match event {
                    ChangeEvent::Removed(id) => Some(ID(id.to_string())),
                    _ => None,
                }
            }))
    }
}
