//! graphql-transport-ws message frames and subscription-document parsing.
//!
//! The durable transport never executes subscription documents through a
//! schema. It parses the document just far enough to learn which topic the
//! client wants and which payload fields it selected, then stores that as a
//! registration. Frame shapes follow the graphql-transport-ws subprotocol.
use serde::{Deserialize, Serialize};
use thiserror::Error;
use todo_core::Topic;

/// Close code for frames the server cannot parse or accept.
pub const CLOSE_BAD_REQUEST: u16 = 4400;
/// Close code for operations attempted before `connection_init` was acked.
pub const CLOSE_UNAUTHORIZED: u16 = 4401;
/// Close code for a subscribe reusing an operation id that is still active.
pub const CLOSE_SUBSCRIBER_EXISTS: u16 = 4409;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("document is not a subscription")]
    NotASubscription,

    #[error("unknown subscription field: {0}")]
    UnknownField(String),
}

/// Frames a client may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectionInit {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    Complete {
        id: String,
    },
    Ping {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
    Pong {
        #[serde(default)]
        payload: Option<serde_json::Value>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribePayload {
    pub query: String,
    #[serde(default, rename = "operationName")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Option<serde_json::Value>,
}

/// Frames the server sends back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionAck,
    Next {
        id: String,
        payload: serde_json::Value,
    },
    Error {
        id: String,
        payload: serde_json::Value,
    },
    Complete {
        id: String,
    },
    Pong,
}

impl ServerMessage {
    pub fn operation_error(id: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            id: id.into(),
            payload: serde_json::json!([{ "message": message.into() }]),
        }
    }

    /// Wire form of the frame. These enums hold only JSON-safe data, so
    /// serialization cannot fail in practice.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    serde_json::from_str(text).map_err(|err| ProtocolError::Malformed(err.to_string()))
}

/// Extract the topic and selected payload fields from a subscription
/// document. Exactly one root field is honored; anything past the first is
/// ignored, matching single-field subscription semantics.
pub fn parse_subscription(
    query: &str,
    operation_name: Option<&str>,
) -> Result<(Topic, Vec<String>), ProtocolError> {
    use async_graphql::parser::types::{OperationType, Selection};

    let document = async_graphql::parser::parse_query(query)
        .map_err(|err| ProtocolError::Malformed(err.to_string()))?;
    let operation = match operation_name {
        Some(name) => document
            .operations
            .iter()
            .find(|(found, _)| found.map(|found| found.as_str()) == Some(name))
            .map(|(_, operation)| operation),
        None => document
            .operations
            .iter()
            .next()
            .map(|(_, operation)| operation),
    }
    .ok_or_else(|| ProtocolError::Malformed("no matching operation".into()))?;

    if operation.node.ty != OperationType::Subscription {
        return Err(ProtocolError::NotASubscription);
    }

    let root = operation
        .node
        .selection_set
        .node
        .items
        .iter()
        .find_map(|selection| match &selection.node {
            Selection::Field(field) => Some(field),
            _ => None,
        })
        .ok_or_else(|| ProtocolError::Malformed("empty selection set".into()))?;

    let field_name = root.node.name.node.as_str();
    let topic = Topic::from_field_name(field_name)
        .map_err(|_| ProtocolError::UnknownField(field_name.to_string()))?;

    let fields = root
        .node
        .selection_set
        .node
        .items
        .iter()
        .filter_map(|selection| match &selection.node {
            Selection::Field(field) => Some(field.node.name.node.to_string()),
            _ => None,
        })
        .collect();

    Ok((topic, fields))
}
