//! Connection hub: a single-owner registry of live connections.
//!
//! The hub runs as one task that exclusively owns the connection maps.
//! Everything else talks to it through a bounded command channel, so
//! registration, teardown, and fan-out are serialized without locks.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RealtimeError;

/// Capacity of each connection's outbound frame queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Capacity of the hub's command channel.
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Frame queued for a freshly registered connection.
pub const WELCOME_FRAME: &str = "Welcome to the chat!";

/// Frame queued right before a connection leaves the registry.
pub const FAREWELL_FRAME: &str = "You have been disconnected from the chat.";

/// Identifies one physical connection. Lets the hub tell a stale actor's
/// unregister apart from its replacement when the same user reconnects.
pub type ConnectionId = Uuid;

/// Outcome of a direct send through the hub.
///
/// `NotConnected` is an ordinary answer, not a failure: callers use it to
/// decide between live push and durable parking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame landed on the receiver's outbound queue.
    Queued,
    /// Receiver has no registered connection.
    NotConnected,
    /// Receiver's outbound queue is full; the frame was dropped.
    QueueFull,
}

impl SendOutcome {
    /// True when the frame reached a live connection's queue.
    pub fn is_delivered(self) -> bool {
        matches!(self, SendOutcome::Queued)
    }
}

struct ActiveConnection {
    user_id: i64,
    sender: mpsc::Sender<String>,
}

enum HubCommand {
    Register {
        connection_id: ConnectionId,
        user_id: i64,
        sender: mpsc::Sender<String>,
    },
    Unregister {
        connection_id: ConnectionId,
        user_id: i64,
    },
    Broadcast {
        frame: String,
    },
    DirectSend {
        user_id: i64,
        frame: String,
        outcome: oneshot::Sender<SendOutcome>,
    },
}

/// The registry itself. Constructed and consumed by [`Hub::spawn`]; all
/// interaction goes through a [`HubHandle`].
pub struct Hub {
    connections: HashMap<ConnectionId, ActiveConnection>,
    by_user: HashMap<i64, ConnectionId>,
    commands: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Spawn the hub's control loop and return a handle to it.
    ///
    /// The loop stops once every handle is dropped.
    pub fn spawn() -> HubHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let hub = Hub {
            connections: HashMap::new(),
            by_user: HashMap::new(),
            commands: command_rx,
        };
        tokio::spawn(hub.run());
        info!("hub control loop started");
        HubHandle {
            commands: command_tx,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("hub command channel closed, stopping");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                connection_id,
                user_id,
                sender,
            } => self.register(connection_id, user_id, sender),
            HubCommand::Unregister {
                connection_id,
                user_id,
            } => self.unregister(connection_id, user_id),
            HubCommand::Broadcast { frame } => self.broadcast(frame),
            HubCommand::DirectSend {
                user_id,
                frame,
                outcome,
            } => {
                // Caller may have stopped waiting; nothing to do then.
                let _ = outcome.send(self.direct_send(user_id, frame));
            }
        }
    }

    fn register(&mut self, connection_id: ConnectionId, user_id: i64, sender: mpsc::Sender<String>) {
        // A second connection for the same identity evicts the first.
        if let Some(old_id) = self.by_user.get(&user_id).copied() {
            debug!(user_id, %old_id, "evicting replaced connection");
            self.drop_connection(old_id);
        }
        if sender.try_send(WELCOME_FRAME.to_owned()).is_err() {
            warn!(user_id, %connection_id, "welcome frame dropped");
        }
        self.by_user.insert(user_id, connection_id);
        self.connections
            .insert(connection_id, ActiveConnection { user_id, sender });
        debug!(
            user_id,
            %connection_id,
            total = self.connections.len(),
            "connection registered"
        );
    }

    fn unregister(&mut self, connection_id: ConnectionId, user_id: i64) {
        // A stale unregister must never touch a replacement connection.
        if !self.connections.contains_key(&connection_id) {
            debug!(user_id, %connection_id, "unregister for unknown connection");
            return;
        }
        self.drop_connection(connection_id);
        debug!(
            user_id,
            %connection_id,
            total = self.connections.len(),
            "connection unregistered"
        );
    }

    /// Farewell the connection and remove it from both maps. Dropping the
    /// queue sender is what lets its writer flush and close the socket.
    fn drop_connection(&mut self, connection_id: ConnectionId) {
        if let Some(connection) = self.connections.remove(&connection_id) {
            let _ = connection.sender.try_send(FAREWELL_FRAME.to_owned());
            if self.by_user.get(&connection.user_id) == Some(&connection_id) {
                self.by_user.remove(&connection.user_id);
            }
        }
    }

    fn broadcast(&mut self, frame: String) {
        let mut stale = Vec::new();
        for (connection_id, connection) in &self.connections {
            match connection.sender.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        user_id = connection.user_id,
                        "outbound queue full, dropping broadcast frame"
                    );
                }
                Err(TrySendError::Closed(_)) => stale.push(*connection_id),
            }
        }
        for connection_id in stale {
            debug!(%connection_id, "removing stale connection");
            self.drop_connection(connection_id);
        }
    }

    fn direct_send(&mut self, user_id: i64, frame: String) -> SendOutcome {
        let Some(connection_id) = self.by_user.get(&user_id).copied() else {
            debug!(user_id, "direct send to unconnected user");
            return SendOutcome::NotConnected;
        };
        let attempt = self
            .connections
            .get(&connection_id)
            .map(|connection| connection.sender.try_send(frame));
        match attempt {
            Some(Ok(())) => SendOutcome::Queued,
            Some(Err(TrySendError::Full(_))) => {
                warn!(user_id, "outbound queue full, frame not delivered");
                SendOutcome::QueueFull
            }
            Some(Err(TrySendError::Closed(_))) | None => {
                debug!(user_id, %connection_id, "direct send hit a dead connection");
                self.drop_connection(connection_id);
                SendOutcome::NotConnected
            }
        }
    }
}

/// Cloneable front for the hub's command channel.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Add a connection for `user_id`. An existing connection for the same
    /// user is evicted first.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
        user_id: i64,
        sender: mpsc::Sender<String>,
    ) -> Result<(), RealtimeError> {
        self.commands
            .send(HubCommand::Register {
                connection_id,
                user_id,
                sender,
            })
            .await
            .map_err(|_| RealtimeError::HubUnavailable)
    }

    /// Remove a connection. A no-op if `connection_id` was already evicted
    /// or replaced.
    pub async fn unregister(
        &self,
        connection_id: ConnectionId,
        user_id: i64,
    ) -> Result<(), RealtimeError> {
        self.commands
            .send(HubCommand::Unregister {
                connection_id,
                user_id,
            })
            .await
            .map_err(|_| RealtimeError::HubUnavailable)
    }

    /// Queue a frame on every live connection.
    pub async fn broadcast(&self, frame: impl Into<String>) -> Result<(), RealtimeError> {
        self.commands
            .send(HubCommand::Broadcast {
                frame: frame.into(),
            })
            .await
            .map_err(|_| RealtimeError::HubUnavailable)
    }

    /// Queue a frame on one user's connection and report where it ended up.
    pub async fn direct_send(
        &self,
        user_id: i64,
        frame: impl Into<String>,
    ) -> Result<SendOutcome, RealtimeError> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::DirectSend {
                user_id,
                frame: frame.into(),
                outcome: outcome_tx,
            })
            .await
            .map_err(|_| RealtimeError::HubUnavailable)?;
        outcome_rx.await.map_err(|_| RealtimeError::HubUnavailable)
    }
}
