// crates/babel-hub/src/hub.rs
//
// EventHub control loop and the cloneable HubHandle used to drive it.
//
// Each user owns at most one principal connection. Every registration gets a
// fresh connection id; removals and acks carry that id so a late message from
// a replaced connection cannot affect its successor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use babel_core::error::BabelError;
use babel_core::traits::EventSink;
use babel_core::Event;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use crate::subscription::{Outbound, Subscription};
use crate::{DEFAULT_CLIENT_BUFFER, DEFAULT_COMMAND_BUFFER, PING_PERIOD, PONG_WAIT};

/// Buffer sizes for the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Outbound messages a client may have queued before it is dropped.
    pub client_buffer: usize,
    /// Pending commands before callers of the handle start waiting; events
    /// published through `EventSink` are dropped instead.
    pub command_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            client_buffer: DEFAULT_CLIENT_BUFFER,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

#[derive(Debug)]
enum Command {
    Register {
        user_id: String,
        sender: mpsc::Sender<Outbound>,
        reply: oneshot::Sender<u64>,
    },
    Unregister {
        user_id: String,
        conn_id: u64,
    },
    Dispatch(Event),
    Ack {
        user_id: String,
        conn_id: u64,
    },
    ClientCount(oneshot::Sender<usize>),
    IsConnected {
        user_id: String,
        reply: oneshot::Sender<bool>,
    },
}

struct ClientEntry {
    conn_id: u64,
    sender: mpsc::Sender<Outbound>,
    last_seen: Instant,
}

impl ClientEntry {
    /// Queue a message without waiting. `false` means the client is dead.
    fn offer(&self, user_id: &str, message: Outbound) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(user_id, conn_id = self.conn_id, "Client buffer full, disconnecting slow consumer");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(user_id, conn_id = self.conn_id, "Client channel closed");
                false
            }
        }
    }
}

/// The single owner of the client set.
pub struct EventHub {
    clients: HashMap<String, ClientEntry>,
    commands: mpsc::Receiver<Command>,
    next_conn_id: u64,
}

impl EventHub {
    /// Start the control loop. It stops once every handle has been dropped.
    pub fn spawn(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let hub = EventHub {
            clients: HashMap::new(),
            commands: rx,
            next_conn_id: 1,
        };
        let handle = HubHandle {
            commands: tx,
            client_buffer: config.client_buffer.max(1),
        };
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    async fn run(mut self) {
        tracing::info!("Event hub started");
        let mut ticker = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = ticker.tick() => self.probe(),
            }
        }

        tracing::info!("Event hub stopped ({} clients dropped)", self.clients.len());
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register {
                user_id,
                sender,
                reply,
            } => {
                let conn_id = self.next_conn_id;
                self.next_conn_id += 1;
                let entry = ClientEntry {
                    conn_id,
                    sender,
                    last_seen: Instant::now(),
                };
                if let Some(previous) = self.clients.insert(user_id.clone(), entry) {
                    tracing::debug!(user_id = %user_id, "Connection {} replaced by {}", previous.conn_id, conn_id);
                }
                tracing::info!(user_id = %user_id, conn_id, clients = self.clients.len(), "Client registered");
                let _ = reply.send(conn_id);
            }
            Command::Unregister { user_id, conn_id } => {
                self.remove_if_current(&user_id, conn_id);
            }
            Command::Dispatch(event) => self.dispatch(event),
            Command::Ack { user_id, conn_id } => {
                if let Some(entry) = self.clients.get_mut(&user_id) {
                    if entry.conn_id == conn_id {
                        entry.last_seen = Instant::now();
                    }
                }
            }
            Command::ClientCount(reply) => {
                let _ = reply.send(self.clients.len());
            }
            Command::IsConnected { user_id, reply } => {
                let _ = reply.send(self.clients.contains_key(&user_id));
            }
        }
    }

    fn remove_if_current(&mut self, user_id: &str, conn_id: u64) {
        let current = self
            .clients
            .get(user_id)
            .is_some_and(|entry| entry.conn_id == conn_id);
        if current {
            self.clients.remove(user_id);
            tracing::info!(user_id, conn_id, clients = self.clients.len(), "Client unregistered");
        } else {
            tracing::trace!(user_id, conn_id, "Ignoring unregister for stale connection");
        }
    }

    fn dispatch(&mut self, event: Event) {
        let kind = event.kind;
        let event = Arc::new(event);

        match event.target_user_id.clone() {
            Some(user_id) => {
                let alive = match self.clients.get(&user_id) {
                    Some(entry) => entry.offer(&user_id, Outbound::Event(Arc::clone(&event))),
                    None => {
                        tracing::trace!(user_id = %user_id, event = ?kind, "No live connection, event dropped");
                        return;
                    }
                };
                if !alive {
                    self.clients.remove(&user_id);
                }
            }
            None => {
                let dead: Vec<String> = self
                    .clients
                    .iter()
                    .filter(|(user_id, entry)| !entry.offer(user_id, Outbound::Event(Arc::clone(&event))))
                    .map(|(user_id, _)| user_id.clone())
                    .collect();
                for user_id in &dead {
                    self.clients.remove(user_id);
                }
                tracing::trace!(event = ?kind, recipients = self.clients.len(), dropped = dead.len(), "Broadcast dispatched");
            }
        }
    }

    /// Drop clients that have not acknowledged within `PONG_WAIT`; ping the rest.
    fn probe(&mut self) {
        let now = Instant::now();
        let mut dead = Vec::new();
        for (user_id, entry) in &self.clients {
            if now.duration_since(entry.last_seen) > PONG_WAIT {
                tracing::info!(user_id = %user_id, conn_id = entry.conn_id, "Client missed liveness window");
                dead.push(user_id.clone());
            } else if !entry.offer(user_id, Outbound::Ping) {
                dead.push(user_id.clone());
            }
        }
        for user_id in dead {
            self.clients.remove(&user_id);
        }
    }
}

/// Cloneable front end to the hub's control loop.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    client_buffer: usize,
}

impl HubHandle {
    async fn send(&self, command: Command) -> Result<(), BabelError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| BabelError::Hub("event hub is not running".to_string()))
    }

    async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, BabelError> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await
            .map_err(|_| BabelError::Hub("event hub stopped before replying".to_string()))
    }

    /// Register a connection for `user_id`, replacing any previous one.
    pub async fn register(&self, user_id: &str) -> Result<Subscription, BabelError> {
        let (sender, receiver) = mpsc::channel(self.client_buffer);
        let user = user_id.to_string();
        let conn_id = self
            .query(|reply| Command::Register {
                user_id: user,
                sender,
                reply,
            })
            .await?;
        Ok(Subscription::new(user_id.to_string(), conn_id, receiver, self.clone()))
    }

    /// Remove a connection if it is still the user's current one.
    pub async fn unregister(&self, user_id: &str, conn_id: u64) -> Result<(), BabelError> {
        self.send(Command::Unregister {
            user_id: user_id.to_string(),
            conn_id,
        })
        .await
    }

    /// Deliver to every registered client.
    pub async fn broadcast(&self, mut event: Event) -> Result<(), BabelError> {
        event.target_user_id = None;
        self.send(Command::Dispatch(event)).await
    }

    /// Deliver to one user if connected; silently dropped otherwise.
    pub async fn send_to_user(&self, user_id: &str, mut event: Event) -> Result<(), BabelError> {
        event.target_user_id = Some(user_id.to_string());
        self.send(Command::Dispatch(event)).await
    }

    pub async fn ack(&self, user_id: &str, conn_id: u64) -> Result<(), BabelError> {
        self.send(Command::Ack {
            user_id: user_id.to_string(),
            conn_id,
        })
        .await
    }

    pub async fn client_count(&self) -> Result<usize, BabelError> {
        self.query(Command::ClientCount).await
    }

    pub async fn is_connected(&self, user_id: &str) -> Result<bool, BabelError> {
        let user_id = user_id.to_string();
        self.query(|reply| Command::IsConnected { user_id, reply }).await
    }
}

/// Publishing never waits on a backlogged control loop: when the command
/// queue is full the event is dropped, like any other best-effort delivery.
#[async_trait]
impl EventSink for HubHandle {
    async fn publish(&self, event: Event) -> Result<(), BabelError> {
        match self.commands.try_send(Command::Dispatch(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(Command::Dispatch(event))) => {
                tracing::warn!(event = ?event.kind, target = ?event.target_user_id, "Hub command queue full, dropping event");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Closed(_)) => {
                Err(BabelError::Hub("event hub is not running".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babel_core::EventKind;
    use serde_json::json;
    use std::time::Duration;

    fn event(n: u64) -> Event {
        Event::broadcast(EventKind::ConsensusUpdate, json!({ "n": n }))
    }

    fn expect_event(message: Option<Outbound>) -> Arc<Event> {
        match message {
            Some(Outbound::Event(event)) => event,
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_and_unicast() {
        let (hub, _task) = EventHub::spawn(HubConfig::default());
        let mut a = hub.register("alice").await.unwrap();
        let mut b = hub.register("bob").await.unwrap();

        hub.broadcast(event(1)).await.unwrap();
        hub.send_to_user("alice", event(2)).await.unwrap();
        assert_eq!(hub.client_count().await.unwrap(), 2);

        assert_eq!(expect_event(a.recv().await).data["n"], 1);
        assert_eq!(expect_event(b.recv().await).data["n"], 1);
        let direct = expect_event(a.recv().await);
        assert_eq!(direct.data["n"], 2);
        assert_eq!(direct.target_user_id.as_deref(), Some("alice"));
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unicast_to_absent_user_is_not_an_error() {
        let (hub, _task) = EventHub::spawn(HubConfig::default());
        hub.send_to_user("ghost", event(1)).await.unwrap();
        hub.publish(Event::to_user("ghost", EventKind::NotifyReputation, json!({})))
            .await
            .unwrap();
        assert_eq!(hub.client_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_slow_consumer_is_disconnected() {
        let (hub, _task) = EventHub::spawn(HubConfig {
            client_buffer: 2,
            command_buffer: 16,
        });
        let mut slow = hub.register("slow").await.unwrap();
        let mut fast = hub.register("fast").await.unwrap();

        for n in 0..3 {
            hub.broadcast(event(n)).await.unwrap();
            assert_eq!(expect_event(fast.recv().await).data["n"], n);
        }

        assert!(!hub.is_connected("slow").await.unwrap());
        assert!(hub.is_connected("fast").await.unwrap());

        // The two buffered events drain, then the closed channel ends the stream.
        assert!(matches!(slow.recv().await, Some(Outbound::Event(_))));
        assert!(matches!(slow.recv().await, Some(Outbound::Event(_))));
        assert!(slow.recv().await.is_none());

        hub.broadcast(event(9)).await.unwrap();
        assert_eq!(expect_event(fast.recv().await).data["n"], 9);
    }

    #[tokio::test]
    async fn test_stale_connection_cannot_unregister_successor() {
        let (hub, _task) = EventHub::spawn(HubConfig::default());
        let mut first = hub.register("alice").await.unwrap();
        let second = hub.register("alice").await.unwrap();
        assert_ne!(first.conn_id(), second.conn_id());

        // Replacing the entry closed the first connection's channel.
        assert!(first.recv().await.is_none());

        first.close().await.unwrap();
        assert!(hub.is_connected("alice").await.unwrap());
        assert_eq!(hub.client_count().await.unwrap(), 1);

        second.close().await.unwrap();
        assert!(!hub.is_connected("alice").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unacknowledged_clients_are_dropped() {
        let (hub, _task) = EventHub::spawn(HubConfig::default());
        let mut quiet = hub.register("quiet").await.unwrap();
        let mut chatty = hub.register("chatty").await.unwrap();

        tokio::time::sleep(PING_PERIOD + Duration::from_secs(1)).await;
        assert_eq!(quiet.recv().await, Some(Outbound::Ping));
        assert_eq!(chatty.recv().await, Some(Outbound::Ping));
        chatty.ack().await.unwrap();

        tokio::time::sleep(PING_PERIOD).await;
        assert!(!hub.is_connected("quiet").await.unwrap());
        assert!(hub.is_connected("chatty").await.unwrap());
        assert_eq!(chatty.recv().await, Some(Outbound::Ping));
        assert!(quiet.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_publish_drops_when_command_queue_is_full() {
        // A handle whose control loop never drains its queue.
        let (commands, mut backlog) = mpsc::channel(1);
        let hub = HubHandle {
            commands,
            client_buffer: 1,
        };

        hub.publish(event(1)).await.unwrap();
        let stalled = tokio::time::timeout(Duration::from_millis(100), hub.publish(event(2))).await;
        assert!(matches!(stalled, Ok(Ok(()))));

        match backlog.try_recv() {
            Ok(Command::Dispatch(queued)) => assert_eq!(queued.data["n"], 1),
            other => panic!("expected the first dispatch, got {:?}", other),
        }
        assert!(backlog.try_recv().is_err());

        drop(backlog);
        assert!(matches!(hub.publish(event(3)).await, Err(BabelError::Hub(_))));
    }

    #[tokio::test]
    async fn test_handle_errors_after_hub_stops() {
        let (hub, task) = EventHub::spawn(HubConfig::default());
        task.abort();
        let _ = task.await;
        assert!(matches!(hub.broadcast(event(1)).await, Err(BabelError::Hub(_))));
    }
}
