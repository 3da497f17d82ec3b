//! Reply channels for writing frames back to a connection.
//!
//! The socket handler and the fan-out publisher only know connection ids;
//! this trait maps an id to whatever transport currently owns the socket.
use crate::{RegistryError, RegistryResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[async_trait::async_trait]
pub trait ConnectionPush: Send + Sync {
    /// Deliver one text frame to a connection. Fails when the connection is
    /// gone; callers treat that as a stale registration, not a fault.
    async fn push(&self, connection_id: &str, frame: String) -> RegistryResult<()>;
}

/// In-process push channel: one unbounded sender per live socket. The
/// websocket task drains the receiver into the actual socket.
#[derive(Default)]
pub struct LocalPushChannel {
    senders: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl LocalPushChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, connection_id: impl Into<String>) -> mpsc::UnboundedReceiver<String> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.senders.lock().insert(connection_id.into(), sender);
        receiver
    }

    pub fn detach(&self, connection_id: &str) {
        self.senders.lock().remove(connection_id);
    }
}

#[async_trait::async_trait]
impl ConnectionPush for LocalPushChannel {
    async fn push(&self, connection_id: &str, frame: String) -> RegistryResult<()> {
        let sender = self
            .senders
            .lock()
            .get(connection_id)
            .cloned()
            .ok_or_else(|| {
                RegistryError::Unexpected(anyhow::anyhow!("unknown connection {connection_id}"))
            })?;
        sender.send(frame).map_err(|_| {
            RegistryError::Unexpected(anyhow::anyhow!("connection {connection_id} closed"))
        })
    }
}
