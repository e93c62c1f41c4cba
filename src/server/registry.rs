//! Process-wide table of live sessions.
//!
//! Sockets and read buffers stay with their owning connection task; the
//! registry only holds identity and counters, and the status endpoint reads
//! snapshot copies, never live handles.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;

use crate::types::{Imei, SessionId, SessionState};

/// Observable state of one connection.
#[derive(Debug)]
pub struct SessionEntry {
    pub id: SessionId,
    pub remote_addr: SocketAddr,
    /// Unix seconds at accept time.
    pub connected_at: u64,
    imei: RwLock<Option<Imei>>,
    state: RwLock<SessionState>,
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
}

impl SessionEntry {
    fn new(id: SessionId, remote_addr: SocketAddr) -> Self {
        let connected_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            id,
            remote_addr,
            connected_at,
            imei: RwLock::new(None),
            state: RwLock::new(SessionState::Unauthenticated),
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    /// Record a successful login.
    pub fn set_authenticated(&self, imei: Imei) {
        *self.imei.write() = Some(imei);
        *self.state.write() = SessionState::Authenticated;
    }

    pub fn mark_closed(&self) {
        *self.state.write() = SessionState::Closed;
    }

    pub fn imei(&self) -> Option<Imei> {
        self.imei.read().clone()
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Count one accepted frame (login or AVL).
    pub fn record_packet(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, n: u64) {
        self.bytes_received.fetch_add(n, Ordering::Relaxed);
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

/// Snapshot row for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: u64,
    pub imei: Option<String>,
    pub connected_at: u64,
    pub packets_received: u64,
}

/// Concurrent session table. Insert/remove from the supervisor, counter
/// updates from the owning read tasks, snapshots from the status endpoint.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection.
    pub fn insert(&self, remote_addr: SocketAddr) -> Arc<SessionEntry> {
        let id = SessionId::next();
        let entry = Arc::new(SessionEntry::new(id, remote_addr));
        self.sessions.insert(id, Arc::clone(&entry));
        entry
    }

    pub fn remove(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Copy out the observable state of every live session.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        let mut rows: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| SessionSnapshot {
                id: entry.id.0,
                imei: entry.imei().map(|imei| imei.as_str().to_owned()),
                connected_at: entry.connected_at,
                packets_received: entry.packets_received(),
            })
            .collect();
        rows.sort_unstable_by_key(|row| row.id);
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40001".parse().unwrap()
    }

    #[test]
    fn insert_and_remove() {
        let registry = SessionRegistry::new();

        let entry = registry.insert(addr());
        assert_eq!(registry.active_count(), 1);
        assert_eq!(entry.state(), SessionState::Unauthenticated);

        registry.remove(entry.id);
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn snapshot_reflects_login_and_counters() {
        let registry = SessionRegistry::new();
        let entry = registry.insert(addr());

        entry.set_authenticated("356307042441013".parse().unwrap());
        entry.record_packet();
        entry.record_packet();
        entry.record_bytes(47);

        let rows = registry.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, entry.id.0);
        assert_eq!(rows[0].imei.as_deref(), Some("356307042441013"));
        assert_eq!(rows[0].packets_received, 2);
        assert_eq!(entry.bytes_received(), 47);
        assert_eq!(entry.state(), SessionState::Authenticated);
    }

    #[test]
    fn snapshot_is_ordered_by_id() {
        let registry = SessionRegistry::new();
        let a = registry.insert(addr());
        let b = registry.insert(addr());

        let rows = registry.snapshot();
        assert_eq!(rows[0].id, a.id.0);
        assert_eq!(rows[1].id, b.id.0);
    }
}
