// Shared data types used across crates: the Item record, change-event
// topics, and the publisher seam between resolvers and the fan-out layer.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid item id: {0}")]
    InvalidId(String),
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
}

/// Strongly typed item identifier so raw strings never cross the store seam.
///
/// ```
/// use std::str::FromStr;
/// use todo_core::ItemId;
///
/// let id = ItemId::new();
/// let parsed = ItemId::from_str(&id.to_string()).expect("parse");
/// assert_eq!(id, parsed);
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ItemId(Uuid);

impl ItemId {
    // Generate a new random id; the store layer owns id assignment.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        // Preserve the original input for clearer error messages.
        let uuid = Uuid::parse_str(input).map_err(|_| Error::InvalidId(input.into()))?;
        Ok(Self(uuid))
    }
}

/// The sole persisted entity. `id` is immutable once assigned; `name` and
/// `done` change in place via partial updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub done: bool,
}

impl Item {
    // New items always start not-done; the store generates the id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(),
            name: name.into(),
            done: false,
        }
    }
}

/// Partial update: only present fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub done: Option<bool>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.done.is_none()
    }

    pub fn apply_to(&self, item: &mut Item) {
        if let Some(name) = &self.name {
            item.name = name.clone();
        }
        if let Some(done) = self.done {
            item.done = done;
        }
    }
}

/// Closed set of change-event channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    ItemCreated,
    ItemUpdated,
    ItemRemoved,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::ItemCreated, Topic::ItemUpdated, Topic::ItemRemoved];

    /// Wire name used in durable registrations.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::ItemCreated => "ITEM_CREATED",
            Topic::ItemUpdated => "ITEM_UPDATED",
            Topic::ItemRemoved => "ITEM_REMOVED",
        }
    }

    /// The GraphQL subscription field this topic feeds.
    pub fn field_name(&self) -> &'static str {
        match self {
            Topic::ItemCreated => "itemCreated",
            Topic::ItemUpdated => "itemUpdated",
            Topic::ItemRemoved => "itemRemoved",
        }
    }

    pub fn from_field_name(name: &str) -> Result<Self> {
        match name {
            "itemCreated" => Ok(Topic::ItemCreated),
            "itemUpdated" => Ok(Topic::ItemUpdated),
            "itemRemoved" => Ok(Topic::ItemRemoved),
            other => Err(Error::UnknownTopic(other.into())),
        }
    }

    // Stable index for array-backed topic tables.
    pub fn index(&self) -> usize {
        match self {
            Topic::ItemCreated => 0,
            Topic::ItemUpdated => 1,
            Topic::ItemRemoved => 2,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "ITEM_CREATED" => Ok(Topic::ItemCreated),
            "ITEM_UPDATED" => Ok(Topic::ItemUpdated),
            "ITEM_REMOVED" => Ok(Topic::ItemRemoved),
            other => Err(Error::UnknownTopic(other.into())),
        }
    }
}

/// Ephemeral notification emitted after a successful durable write.
/// Never persisted; consumed at most once per registered subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChangeEvent {
    Created(Item),
    Updated(Item),
    Removed(ItemId),
}

impl ChangeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ChangeEvent::Created(_) => Topic::ItemCreated,
            ChangeEvent::Updated(_) => Topic::ItemUpdated,
            ChangeEvent::Removed(_) => Topic::ItemRemoved,
        }
    }

    /// GraphQL-shaped payload: the full item projection for created/updated,
    /// the bare id for removed.
    pub fn payload_json(&self) -> serde_json::Value {
        match self {
            ChangeEvent::Created(item) | ChangeEvent::Updated(item) => serde_json::json!({
                "id": item.id.to_string(),
                "name": item.name,
                "done": item.done,
            }),
            ChangeEvent::Removed(id) => serde_json::Value::String(id.to_string()),
        }
    }
}

/// Fire-and-forget notification sink. Implementations must never fail the
/// caller: delivery problems are handled (logged, skipped) internally so a
/// mutation's success is independent of fan-out.
#[async_trait::async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: ChangeEvent);
}
