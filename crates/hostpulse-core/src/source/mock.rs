//! In-memory data source for tests and demos.
//!
//! `MockSource` behaves like the remote service: snapshots are served newest
//! first and truncated to the requested limit, timestamps are zone-less. Each
//! fetch kind can be made to fail or to hang until released, so poll-loop
//! behavior under partial failure and teardown can be exercised on virtual time.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{DataSource, FetchError, FetchKind};
use crate::model::{Alert, EntityId, EntityRecord, RawSnapshot, Ticket};

#[derive(Debug, Default)]
struct MockState {
    entities: Vec<EntityRecord>,
    /// Oldest first.
    snapshots: HashMap<EntityId, Vec<RawSnapshot>>,
    tickets: HashMap<EntityId, Vec<Ticket>>,
    alerts: Vec<Alert>,
    failing: HashSet<FetchKind>,
    held: HashSet<FetchKind>,
    calls: HashMap<FetchKind, usize>,
}

/// Scriptable in-memory [`DataSource`].
#[derive(Debug, Default)]
pub struct MockSource {
    state: Mutex<MockState>,
    gate: Notify,
}

impl MockSource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a wire snapshot with a zone-less timestamp, as the service sends it.
    pub fn raw_snapshot(
        timestamp: &str,
        network_sent: u64,
        network_recv: u64,
        disk_read_bytes: u64,
        disk_write_bytes: u64,
    ) -> RawSnapshot {
        RawSnapshot {
            timestamp: timestamp.to_string(),
            cpu_usage: 10.0,
            memory_used: 4 * 1024 * 1024 * 1024,
            memory_total: Some(16 * 1024 * 1024 * 1024),
            disk_usage: 50.0,
            network_sent: Some(network_sent),
            network_recv: Some(network_recv),
            disk_read_bytes: Some(disk_read_bytes),
            disk_write_bytes: Some(disk_write_bytes),
            process_count: Some(180),
            top_processes: None,
            boot_time: None,
            uptime_seconds: None,
            uptime_human: None,
        }
    }

    /// Registers a machine.
    pub fn add_entity(&self, record: EntityRecord) {
        let mut st = self.lock();
        st.entities.retain(|e| e.id != record.id);
        st.entities.push(record);
    }

    /// Removes a machine and its data.
    pub fn remove_entity(&self, id: EntityId) {
        let mut st = self.lock();
        st.entities.retain(|e| e.id != id);
        st.snapshots.remove(&id);
        st.tickets.remove(&id);
    }

    /// Records a new snapshot for a machine (appended as newest).
    pub fn push_snapshot(&self, id: EntityId, snapshot: RawSnapshot) {
        self.lock().snapshots.entry(id).or_default().push(snapshot);
    }

    pub fn set_tickets(&self, id: EntityId, tickets: Vec<Ticket>) {
        self.lock().tickets.insert(id, tickets);
    }

    pub fn set_alerts(&self, alerts: Vec<Alert>) {
        self.lock().alerts = alerts;
    }

    /// Makes every fetch of `kind` fail until [`recover`](Self::recover).
    pub fn fail(&self, kind: FetchKind) {
        self.lock().failing.insert(kind);
    }

    pub fn recover(&self, kind: FetchKind) {
        self.lock().failing.remove(&kind);
    }

    /// Makes fetches of `kind` hang until [`release`](Self::release).
    pub fn hold(&self, kind: FetchKind) {
        self.lock().held.insert(kind);
    }

    /// Lets held fetches of `kind` complete.
    pub fn release(&self, kind: FetchKind) {
        self.lock().held.remove(&kind);
        self.gate.notify_waiters();
    }

    /// Number of fetches of `kind` issued so far (including hanging ones).
    pub fn calls(&self, kind: FetchKind) -> usize {
        self.lock().calls.get(&kind).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // Ignore poisoning left by a panicked test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, kind: FetchKind) -> Result<(), FetchError> {
        *self.lock().calls.entry(kind).or_default() += 1;

        loop {
            let released = self.gate.notified();
            if !self.lock().held.contains(&kind) {
                break;
            }
            released.await;
        }

        if self.lock().failing.contains(&kind) {
            return Err(FetchError::Unavailable(format!("{kind} fetch failing")));
        }
        Ok(())
    }
}

#[async_trait]
impl DataSource for MockSource {
    async fn fetch_entity(&self, id: EntityId) -> Result<EntityRecord, FetchError> {
        self.enter(FetchKind::Entity).await?;
        self.lock()
            .entities
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: 404,
                message: "System not found".to_string(),
            })
    }

    async fn fetch_snapshots(
        &self,
        id: EntityId,
        limit: usize,
    ) -> Result<Vec<RawSnapshot>, FetchError> {
        self.enter(FetchKind::Snapshots).await?;
        let st = self.lock();
        let stored = st.snapshots.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        Ok(stored.iter().rev().take(limit).cloned().collect())
    }

    async fn fetch_auxiliary(&self, id: EntityId) -> Result<Vec<Ticket>, FetchError> {
        self.enter(FetchKind::Auxiliary).await?;
        Ok(self.lock().tickets.get(&id).cloned().unwrap_or_default())
    }

    async fn fetch_entities(&self) -> Result<Vec<EntityRecord>, FetchError> {
        self.enter(FetchKind::Entities).await?;
        Ok(self.lock().entities.clone())
    }

    async fn fetch_alerts(&self) -> Result<Vec<Alert>, FetchError> {
        self.enter(FetchKind::Alerts).await?;
        Ok(self
            .lock()
            .alerts
            .iter()
            .filter(|a| !a.is_resolved)
            .cloned()
            .collect())
    }
}
