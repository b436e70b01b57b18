// crates/babel-hub/src/subscription.rs
//
// The subscriber side of a hub registration.

use std::sync::Arc;

use babel_core::error::BabelError;
use babel_core::Event;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::hub::HubHandle;

/// Something the hub wants written to a subscriber's transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A domain event, shared between every recipient of a broadcast.
    Event(Arc<Event>),
    /// A liveness probe; the transport should answer with any inbound frame.
    Ping,
}

/// A live registration with the hub.
///
/// The receiver yields `None` once the hub has dropped this connection
/// (unregistered, replaced by a newer connection, slow, or unresponsive).
#[derive(Debug)]
pub struct Subscription {
    user_id: String,
    conn_id: u64,
    receiver: mpsc::Receiver<Outbound>,
    handle: HubHandle,
}

impl Subscription {
    pub(crate) fn new(
        user_id: String,
        conn_id: u64,
        receiver: mpsc::Receiver<Outbound>,
        handle: HubHandle,
    ) -> Self {
        Self {
            user_id,
            conn_id,
            receiver,
            handle,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn handle(&self) -> &HubHandle {
        &self.handle
    }

    /// Wait for the next outbound message.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Report that the transport heard from the client.
    pub async fn ack(&self) -> Result<(), BabelError> {
        self.handle.ack(&self.user_id, self.conn_id).await
    }

    /// Unregister this connection. A newer connection of the same user is
    /// left alone.
    pub async fn close(self) -> Result<(), BabelError> {
        self.handle.unregister(&self.user_id, self.conn_id).await
    }
}
