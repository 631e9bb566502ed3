use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;

use crate::error::{Result, RoadTrackerError};
use crate::types::UserId;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

pub type ConnectionId = u64;

/// Serialized payload shared by every connection of a fan-out
pub type Payload = Arc<str>;

/// Connection lifecycle: Unsubscribed -> Subscribed -> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unsubscribed,
    Subscribed(UserId),
    Closed,
}

/// A live-subscriber connection as seen by the registry
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

type UserConnections = HashMap<UserId, HashMap<ConnectionId, mpsc::Sender<Payload>>>;

/// Tracks which connections are subscribed to which user.
///
/// Shared (via `Arc`) between the ingest path, which reads it on every
/// fan-out, and the connection handlers, which mutate it. Readers take a
/// snapshot of the senders and release the lock before sending.
pub struct SubscriptionRegistry {
    users: RwLock<UserConnections>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        SubscriptionRegistry {
            users: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// New connection in the Unsubscribed state
    pub fn open(&self) -> Connection {
        Connection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            state: ConnectionState::Unsubscribed,
        }
    }

    /// Unsubscribed -> Subscribed. Returns the connection's outbound queue.
    pub fn subscribe(
        &self,
        conn: &mut Connection,
        user_id: UserId,
    ) -> Result<mpsc::Receiver<Payload>> {
        match conn.state {
            ConnectionState::Unsubscribed => {}
            ConnectionState::Subscribed(current) => {
                return Err(RoadTrackerError::InvalidState(format!(
                    "connection {} already subscribed to user {}",
                    conn.id, current
                )));
            }
            ConnectionState::Closed => {
                return Err(RoadTrackerError::InvalidState(format!(
                    "connection {} is closed",
                    conn.id
                )));
            }
        }

        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.write()?.entry(user_id).or_default().insert(conn.id, tx);
        conn.state = ConnectionState::Subscribed(user_id);
        log::info!("Connection {} subscribed to user {}", conn.id, user_id);
        Ok(rx)
    }

    /// Any state -> Closed. Returns false if the connection was already closed.
    pub fn close(&self, conn: &mut Connection) -> bool {
        match conn.state {
            ConnectionState::Closed => false,
            ConnectionState::Unsubscribed => {
                conn.state = ConnectionState::Closed;
                true
            }
            ConnectionState::Subscribed(user_id) => {
                self.remove(user_id, conn.id);
                conn.state = ConnectionState::Closed;
                log::info!("Connection {} unsubscribed from user {}", conn.id, user_id);
                true
            }
        }
    }

    /// Senders for every connection currently subscribed to `user_id`
    pub fn snapshot(&self, user_id: UserId) -> Vec<(ConnectionId, mpsc::Sender<Payload>)> {
        match self.read() {
            Ok(users) => users
                .get(&user_id)
                .map(|conns| conns.iter().map(|(id, tx)| (*id, tx.clone())).collect())
                .unwrap_or_default(),
            Err(e) => {
                log::error!("Registry unavailable: {}", e);
                Vec::new()
            }
        }
    }

    /// Drop a handle whose receiver is gone
    pub fn remove(&self, user_id: UserId, conn_id: ConnectionId) {
        if let Ok(mut users) = self.write() {
            if let Some(conns) = users.get_mut(&user_id) {
                conns.remove(&conn_id);
                if conns.is_empty() {
                    users.remove(&user_id);
                }
            }
        }
    }

    pub fn subscriber_count(&self, user_id: UserId) -> usize {
        self.read()
            .ok()
            .and_then(|users| users.get(&user_id).map(|c| c.len()))
            .unwrap_or(0)
    }

    pub fn user_count(&self) -> usize {
        self.read().map(|users| users.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, UserConnections>> {
        self.users
            .read()
            .map_err(|_| RoadTrackerError::InvalidState("registry lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, UserConnections>> {
        self.users
            .write()
            .map_err(|_| RoadTrackerError::InvalidState("registry lock poisoned".to_string()))
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
