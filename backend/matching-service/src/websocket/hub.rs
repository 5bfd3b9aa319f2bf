//! Connection hub: the single in-process registry of live client sockets.
//!
//! Membership changes (register, unregister, eviction) and broadcasts are
//! serialized through one processing loop, so they are totally ordered.
//! Targeted sends skip the loop and read the registry under a shared lock.
//!
//! Clients never hold a reference back into the hub. A connection is known by
//! `(user_id, ConnectionId)` and all removal goes through the map, which only
//! drops an entry whose id still matches. Dropping an entry drops its sender,
//! which closes the channel and ends the client's writer loop.

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::websocket::message_types::WsOutboundEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};
use uuid::Uuid;

/// Opaque id distinguishing successive connections of the same user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

struct ClientEntry {
    id: ConnectionId,
    sender: mpsc::Sender<String>,
}

enum HubCommand {
    Register {
        user_id: Uuid,
        entry: ClientEntry,
        ack: oneshot::Sender<()>,
    },
    Unregister {
        user_id: Uuid,
        id: ConnectionId,
        ack: Option<oneshot::Sender<bool>>,
    },
    Broadcast {
        frame: String,
    },
}

/// The receiving half handed to a freshly registered client.
pub struct ClientConnection {
    pub user_id: Uuid,
    pub id: ConnectionId,
    pub receiver: mpsc::Receiver<String>,
}

/// Outcome of a targeted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NotConnected,
    /// The buffer was full; the client has been scheduled for disconnection.
    Evicted,
}

type Registry = Arc<RwLock<HashMap<Uuid, ClientEntry>>>;

#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    clients: Registry,
    next_id: Arc<AtomicU64>,
    buffer_size: usize,
}

impl Hub {
    /// Start the processing loop on the current tokio runtime.
    ///
    /// The loop exits once every `Hub` handle has been dropped.
    pub fn spawn(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let clients: Registry = Arc::default();
        tokio::spawn(run_loop(rx, clients.clone()));

        Self {
            commands: tx,
            clients,
            next_id: Arc::new(AtomicU64::new(1)),
            buffer_size: buffer_size.max(1),
        }
    }

    /// Register a live connection for `user_id`, replacing any prior one.
    ///
    /// Returns after the loop has applied the change, so sends issued after
    /// this call reach the new connection.
    pub async fn register(&self, user_id: Uuid) -> AppResult<ClientConnection> {
        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (ack_tx, ack_rx) = oneshot::channel();

        self.commands
            .send(HubCommand::Register {
                user_id,
                entry: ClientEntry { id, sender },
                ack: ack_tx,
            })
            .map_err(|_| AppError::Internal)?;
        ack_rx.await.map_err(|_| AppError::Internal)?;

        Ok(ClientConnection {
            user_id,
            id,
            receiver,
        })
    }

    /// Remove the connection if it is still the registered one. Idempotent.
    ///
    /// Returns `true` when this call removed the entry.
    pub async fn unregister(&self, user_id: Uuid, id: ConnectionId) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .commands
            .send(HubCommand::Unregister {
                user_id,
                id,
                ack: Some(ack_tx),
            })
            .is_err()
        {
            return false;
        }
        ack_rx.await.unwrap_or(false)
    }

    /// Non-blocking enqueue of one frame for one user.
    pub async fn send_to_user(&self, user_id: Uuid, frame: String) -> Delivery {
        let guard = self.clients.read().await;
        let Some(entry) = guard.get(&user_id) else {
            return Delivery::NotConnected;
        };

        match entry.sender.try_send(frame) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(user_id = %user_id, "slow consumer, evicting connection");
                metrics::record_eviction();
                let _ = self.commands.send(HubCommand::Unregister {
                    user_id,
                    id: entry.id,
                    ack: None,
                });
                Delivery::Evicted
            }
            Err(TrySendError::Closed(_)) => Delivery::NotConnected,
        }
    }

    pub async fn send_event(&self, user_id: Uuid, event: &WsOutboundEvent) -> Delivery {
        match event.to_frame() {
            Ok(frame) => self.send_to_user(user_id, frame).await,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode websocket event");
                Delivery::NotConnected
            }
        }
    }

    /// Queue a frame for every registered client.
    pub fn broadcast_all(&self, frame: String) {
        let _ = self.commands.send(HubCommand::Broadcast { frame });
    }

    pub fn broadcast_event(&self, event: &WsOutboundEvent) {
        match event.to_frame() {
            Ok(frame) => self.broadcast_all(frame),
            Err(e) => tracing::error!(error = %e, "failed to encode websocket event"),
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.clients.read().await.contains_key(&user_id)
    }

    pub async fn connected_count(&self) -> usize {
        self.clients.read().await.len()
    }
}

async fn run_loop(mut rx: mpsc::UnboundedReceiver<HubCommand>, clients: Registry) {
    while let Some(command) = rx.recv().await {
        match command {
            HubCommand::Register {
                user_id,
                entry,
                ack,
            } => {
                let mut guard = clients.write().await;
                if let Some(previous) = guard.insert(user_id, entry) {
                    tracing::debug!(
                        user_id = %user_id,
                        connection = previous.id.0,
                        "replaced existing connection"
                    );
                }
                metrics::set_connected(guard.len());
                drop(guard);
                let _ = ack.send(());
            }
            HubCommand::Unregister { user_id, id, ack } => {
                let mut guard = clients.write().await;
                let removed = guard.get(&user_id).map(|entry| entry.id) == Some(id)
                    && guard.remove(&user_id).is_some();
                if removed {
                    tracing::debug!(
                        user_id = %user_id,
                        remaining = guard.len(),
                        "removed connection"
                    );
                }
                metrics::set_connected(guard.len());
                drop(guard);
                if let Some(ack) = ack {
                    let _ = ack.send(removed);
                }
            }
            HubCommand::Broadcast { frame } => {
                let mut guard = clients.write().await;
                let before = guard.len();
                guard.retain(|user_id, entry| match entry.sender.try_send(frame.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(user_id = %user_id, "slow consumer dropped during broadcast");
                        metrics::record_eviction();
                        false
                    }
                    Err(TrySendError::Closed(_)) => false,
                });
                if guard.len() != before {
                    tracing::debug!(
                        dropped = before - guard.len(),
                        active = guard.len(),
                        "broadcast cleaned up dead clients"
                    );
                }
                metrics::set_connected(guard.len());
            }
        }
    }
    tracing::debug!("hub loop stopped");
}
