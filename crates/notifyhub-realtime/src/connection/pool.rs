//! Connection pool: tracks all active connections indexed by user ID.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use notifyhub_core::types::{SocketId, UserId};

use super::handle::ConnectionHandle;

/// Thread-safe pool of all active connections.
///
/// Admission reserves a slot with a single atomic update so that concurrent
/// handshakes can never push the pool past its capacity.
#[derive(Debug)]
pub struct ConnectionPool {
    /// User ID → list of connection handles (one user can have multiple connections).
    by_user: DashMap<UserId, Vec<Arc<ConnectionHandle>>>,
    /// Socket ID → connection handle for direct lookup.
    by_id: DashMap<SocketId, Arc<ConnectionHandle>>,
    /// Admitted connections, including ones being inserted.
    reserved: AtomicUsize,
    /// Maximum number of connections.
    capacity: usize,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new(capacity: usize) -> Self {
        Self {
            by_user: DashMap::new(),
            by_id: DashMap::new(),
            reserved: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Adds a connection unless the pool is full. Returns `false` when full.
    pub fn try_add(&self, handle: Arc<ConnectionHandle>) -> bool {
        let reserved = self
            .reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            });
        if reserved.is_err() {
            return false;
        }

        self.by_id.insert(handle.id, handle.clone());
        self.by_user.entry(handle.user_id).or_default().push(handle);
        true
    }

    /// Removes a connection from the pool.
    pub fn remove(&self, socket_id: &SocketId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.by_id.remove(socket_id)?;
        if let Some(mut connections) = self.by_user.get_mut(&handle.user_id) {
            connections.retain(|c| c.id != *socket_id);
        }
        self.by_user
            .remove_if(&handle.user_id, |_, connections| connections.is_empty());
        self.reserved.fetch_sub(1, Ordering::AcqRel);
        Some(handle)
    }

    /// Gets all connections for a user.
    pub fn get_user_connections(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Gets a specific connection by ID.
    pub fn get(&self, socket_id: &SocketId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(socket_id).map(|entry| entry.value().clone())
    }

    /// Returns total number of active connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of unique connected users.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    /// Sum of per-user connection counts.
    pub fn indexed_count(&self) -> usize {
        self.by_user.iter().map(|entry| entry.value().len()).sum()
    }

    /// Returns all connection handles.
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Returns all connected user IDs.
    pub fn connected_user_ids(&self) -> Vec<UserId> {
        self.by_user.iter().map(|entry| *entry.key()).collect()
    }
}
