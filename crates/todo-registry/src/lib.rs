//! Durable subscriber registry for the stateless transport variant.
//!
//! Where the monolithic server keeps subscriber channels in process memory,
//! this crate externalizes them: every websocket connection and every active
//! subscription is a keyed record in a [`store::RegistryStore`], so any
//! stateless handler invocation can resume the session. The pieces:
//!
//! - [`store`]: connection and subscription records plus the memory and
//!   DynamoDB backends that hold them.
//! - [`protocol`]: the graphql-transport-ws message frames and the
//!   subscription-document parser.
//! - [`socket`]: the per-event socket lifecycle handler (connect, message,
//!   disconnect), written so each call stands alone.
//! - [`push`]: the reply channel used to write frames back to a connection.
//! - [`publisher`]: the fan-out side, reading the registry on every change
//!   event and pushing projected payloads to each subscriber.

pub mod protocol;
pub mod publisher;
pub mod push;
pub mod socket;
pub mod store;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A stored record is missing attributes or holds values that do not
    /// decode. Surfaced instead of silently skipping so operators see it.
    #[error("corrupt registry record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type RegistryResult<T> = Result<T, RegistryError>;

pub use publisher::DurablePublisher;
pub use push::{ConnectionPush, LocalPushChannel};
pub use socket::{SocketDisposition, SocketEvent, SocketHandler};
pub use store::{ConnectionRecord, RegistryStore, SubscriptionRecord};
