//! Composition root: one sample window per monitored entity, fed by poll cycles.
//!
//! The engine is the only owner of windows. Consumers get [`EntityView`]
//! projections that share the window's frozen contents and cached rate series
//! but can never reach the buffer itself.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::fmt::format_uptime;
use crate::model::{EntityId, EntityRecord, MetricKey, RawSnapshot, Snapshot, Ticket};
use crate::rates::{Counter, DerivedRates};
use crate::scheduler::{CycleId, CycleStatus};
use crate::source::{Criticality, FetchError, FetchKind};
use crate::window::{DEFAULT_WINDOW_CAPACITY, Points, SampleWindow, Series};

/// Snapshots requested per cycle.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 100;

/// Order in which a data source returns a snapshot batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotOrder {
    Ascending,
    /// Newest first (the remote API's convention).
    #[default]
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub window_capacity: usize,
    pub snapshot_limit: usize,
    pub snapshot_order: SnapshotOrder,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
            snapshot_order: SnapshotOrder::default(),
        }
    }
}

/// Outcome of ingesting one snapshot batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub appended: usize,
    pub skipped_malformed: usize,
    /// Samples already held or already delivered by the previous batch.
    pub skipped_seen: usize,
}

/// Everything one detail-view cycle fetched.
///
/// `snapshots` and `auxiliary` are `None` when they were not issued because
/// the critical fetch failed first.
#[derive(Debug, Clone)]
pub struct EntityFetch {
    pub record: Result<EntityRecord, FetchError>,
    pub snapshots: Option<Result<Vec<RawSnapshot>, FetchError>>,
    pub auxiliary: Option<Result<Vec<Ticket>, FetchError>>,
}

impl EntityFetch {
    pub fn critical_failure(error: FetchError) -> Self {
        Self {
            record: Err(error),
            snapshots: None,
            auxiliary: None,
        }
    }
}

#[derive(Debug)]
struct EntityState {
    window: SampleWindow,
    record: Option<EntityRecord>,
    auxiliary: Vec<Ticket>,
    status: Option<CycleStatus>,
    /// Instants of the last non-empty batch.
    last_batch: HashSet<DateTime<Utc>>,
}

impl EntityState {
    fn new(capacity: usize) -> Self {
        Self {
            window: SampleWindow::new(capacity),
            record: None,
            auxiliary: Vec::new(),
            status: None,
            last_batch: HashSet::new(),
        }
    }

    fn ingest(
        &mut self,
        entity: EntityId,
        mut batch: Vec<RawSnapshot>,
        order: SnapshotOrder,
    ) -> IngestReport {
        if order == SnapshotOrder::Descending {
            batch.reverse();
        }

        let mut report = IngestReport::default();
        let mut instants = HashSet::with_capacity(batch.len());

        for raw in batch {
            let snapshot = match Snapshot::from_raw(raw) {
                Ok(s) => s,
                Err(e) => {
                    warn!(entity, error = %e, "skipping malformed snapshot");
                    report.skipped_malformed += 1;
                    continue;
                }
            };
            let instant = snapshot.instant;
            if !instants.insert(instant)
                || self.last_batch.contains(&instant)
                || self.window.contains_instant(instant)
            {
                report.skipped_seen += 1;
                continue;
            }
            self.window.append(snapshot);
            report.appended += 1;
        }

        if !instants.is_empty() {
            self.last_batch = instants;
        }
        report
    }
}

/// Owns all sample windows and the last known state of each entity.
#[derive(Debug, Default)]
pub struct MetricsEngine {
    config: EngineConfig,
    entities: HashMap<EntityId, EntityState>,
}

impl MetricsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            entities: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts tracking `id`. Returns `false` if it was already tracked.
    pub fn track(&mut self, id: EntityId) -> bool {
        if self.entities.contains_key(&id) {
            return false;
        }
        debug!(entity = id, capacity = self.config.window_capacity, "tracking entity");
        self.entities
            .insert(id, EntityState::new(self.config.window_capacity));
        true
    }

    /// Stops tracking `id` and drops its window.
    pub fn untrack(&mut self, id: EntityId) -> bool {
        let removed = self.entities.remove(&id).is_some();
        if removed {
            debug!(entity = id, "untracked entity");
        }
        removed
    }

    pub fn is_tracked(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn tracked(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Normalizes and appends a batch. `None` if `id` is not tracked.
    pub fn ingest_snapshots(
        &mut self,
        id: EntityId,
        batch: Vec<RawSnapshot>,
    ) -> Option<IngestReport> {
        let order = self.config.snapshot_order;
        let state = self.entities.get_mut(&id)?;
        let was_empty = state.window.is_empty();
        let report = state.ingest(id, batch, order);
        if was_empty && report.appended > 0 {
            info!(entity = id, samples = report.appended, "first snapshots ingested");
        }
        Some(report)
    }

    /// Applies one cycle's fetch results for `id`.
    ///
    /// A failed critical fetch leaves everything untouched. Non-critical
    /// results are applied independently; a failed one keeps its previous
    /// data. Returns `None` (and changes nothing) if `id` is not tracked.
    pub fn apply_cycle(
        &mut self,
        id: EntityId,
        cycle: CycleId,
        fetch: EntityFetch,
    ) -> Option<CycleStatus> {
        if !self.is_tracked(id) {
            debug!(entity = id, %cycle, "discarding cycle for untracked entity");
            return None;
        }

        let mut status = CycleStatus::ok(cycle);
        let record = match fetch.record {
            Ok(record) => Some(record),
            Err(e) => {
                log_failure(id, cycle, FetchKind::Entity, &e);
                status.record_failure(FetchKind::Entity, e);
                None
            }
        };
        if status.critical_failed {
            if let Some(state) = self.entities.get_mut(&id) {
                state.status = Some(status.clone());
            }
            return Some(status);
        }

        match fetch.snapshots {
            Some(Ok(batch)) => {
                if let Some(report) = self.ingest_snapshots(id, batch) {
                    debug!(
                        entity = id,
                        %cycle,
                        appended = report.appended,
                        skipped_seen = report.skipped_seen,
                        skipped_malformed = report.skipped_malformed,
                        "snapshots ingested"
                    );
                }
            }
            Some(Err(e)) => {
                log_failure(id, cycle, FetchKind::Snapshots, &e);
                status.record_failure(FetchKind::Snapshots, e);
            }
            None => {}
        }

        if let Some(state) = self.entities.get_mut(&id) {
            if record.is_some() {
                state.record = record;
            }
            match fetch.auxiliary {
                Some(Ok(tickets)) => state.auxiliary = tickets,
                Some(Err(e)) => {
                    log_failure(id, cycle, FetchKind::Auxiliary, &e);
                    status.record_failure(FetchKind::Auxiliary, e);
                }
                None => {}
            }
            state.status = Some(status.clone());
        }

        Some(status)
    }

    /// Read-only projection of `id` as of now.
    pub fn current_view(&self, id: EntityId) -> Option<EntityView> {
        let state = self.entities.get(&id)?;
        let window = &state.window;
        Some(EntityView {
            entity: id,
            record: state.record.clone(),
            latest: window.latest().cloned(),
            rates: window.derived_rates(),
            auxiliary: state.auxiliary.clone(),
            status: state.status.clone(),
            samples: window.snapshots(),
            rate_series: Counter::ALL.map(|c| window.rate_series(c)),
        })
    }
}

fn log_failure(entity: EntityId, cycle: CycleId, kind: FetchKind, e: &FetchError) {
    match kind.criticality() {
        Criticality::Critical => {
            error!(entity, %cycle, source = %kind, error = %e, "critical fetch failed")
        }
        Criticality::NonCritical => {
            warn!(entity, %cycle, source = %kind, error = %e, "non-critical fetch failed")
        }
    }
}

/// What the presentation layer sees of one entity at one tick.
#[derive(Debug, Clone)]
pub struct EntityView {
    pub entity: EntityId,
    /// Last successfully fetched static attributes.
    pub record: Option<EntityRecord>,
    pub latest: Option<Snapshot>,
    pub rates: DerivedRates,
    /// Last successfully fetched tickets.
    pub auxiliary: Vec<Ticket>,
    /// Status of the most recent applied cycle.
    pub status: Option<CycleStatus>,
    samples: Arc<[Snapshot]>,
    rate_series: [Points; 4],
}

impl EntityView {
    /// Raw series of `key`, oldest first.
    pub fn series(&self, key: MetricKey) -> Series {
        Series::new(self.samples.clone(), key)
    }

    /// Display-unit rate series of `counter`, oldest first.
    pub fn rate_series(&self, counter: Counter) -> Points {
        self.rate_series[counter as usize].clone()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Uptime label: the agent's own text if sent, else derived from boot time.
    pub fn uptime(&self, now: DateTime<Utc>) -> String {
        match &self.latest {
            Some(Snapshot {
                uptime_human: Some(text),
                ..
            }) => text.clone(),
            Some(s) => format_uptime(s.boot_time, now),
            None => format_uptime(None, now),
        }
    }
}
