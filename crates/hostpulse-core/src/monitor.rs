//! Monitored views: poll targets that fetch from a [`DataSource`] and publish
//! read-only projections over a `watch` channel.
//!
//! - [`EntityMonitor`] drives the machine detail view: the entity record is
//!   critical, snapshots and tickets are not.
//! - [`FleetMonitor`] drives the overview: machines and unresolved alerts,
//!   both critical.
//!
//! Run either one with [`PollScheduler::run`](crate::scheduler::PollScheduler::run).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::engine::{EngineConfig, EntityFetch, EntityView, MetricsEngine};
use crate::model::{Alert, EntityId, EntityRecord};
use crate::scheduler::{CycleId, CycleStatus, PollTarget};
use crate::source::{Criticality, DataSource, FetchError, FetchKind};

// ============================================================
// Detail view
// ============================================================

pub struct EntityMonitor<S> {
    source: Arc<S>,
    entity: EntityId,
    engine: MetricsEngine,
    tx: watch::Sender<Option<Arc<EntityView>>>,
}

impl<S: DataSource> EntityMonitor<S> {
    pub fn new(source: Arc<S>, entity: EntityId, config: EngineConfig) -> Self {
        let mut engine = MetricsEngine::new(config);
        engine.track(entity);
        let (tx, _) = watch::channel(None);
        Self {
            source,
            entity,
            engine,
            tx,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Receives a fresh [`EntityView`] after every applied cycle, and `None`
    /// once the monitor is torn down.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<EntityView>>> {
        self.tx.subscribe()
    }

    pub fn engine(&self) -> &MetricsEngine {
        &self.engine
    }

    fn publish(&self) {
        let view = self.engine.current_view(self.entity).map(Arc::new);
        self.tx.send_replace(view);
    }
}

#[async_trait]
impl<S: DataSource> PollTarget for EntityMonitor<S> {
    type Fetched = EntityFetch;

    async fn fetch(&self, cycle: CycleId) -> EntityFetch {
        let id = self.entity;
        let record = match self.source.fetch_entity(id).await {
            Ok(r) => r,
            Err(e) => return EntityFetch::critical_failure(e),
        };
        debug!(entity = id, %cycle, "critical fetch done");

        let limit = self.engine.config().snapshot_limit;
        let (snapshots, auxiliary) = tokio::join!(
            self.source.fetch_snapshots(id, limit),
            self.source.fetch_auxiliary(id),
        );
        EntityFetch {
            record: Ok(record),
            snapshots: Some(snapshots),
            auxiliary: Some(auxiliary),
        }
    }

    fn apply(&mut self, cycle: CycleId, fetched: EntityFetch) -> CycleStatus {
        let status = self
            .engine
            .apply_cycle(self.entity, cycle, fetched)
            .unwrap_or_else(|| CycleStatus::ok(cycle));
        self.publish();
        status
    }

    fn teardown(&mut self) {
        self.engine.untrack(self.entity);
        self.tx.send_replace(None);
        info!(entity = self.entity, "detail view torn down");
    }
}

// ============================================================
// Fleet overview
// ============================================================

/// Read-only projection of the overview.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetView {
    pub entities: Vec<EntityRecord>,
    /// Unresolved alerts.
    pub alerts: Vec<Alert>,
    /// Status of the most recent cycle; `None` before the first one.
    pub status: Option<CycleStatus>,
}

impl FleetView {
    pub fn total(&self) -> usize {
        self.entities.len()
    }

    pub fn online(&self) -> usize {
        self.entities.iter().filter(|e| e.is_active).count()
    }

    pub fn offline(&self) -> usize {
        self.total() - self.online()
    }

    pub fn alerts_for(&self, id: EntityId) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(move |a| a.system_id == id)
    }
}

pub struct FleetFetch {
    pub entities: Result<Vec<EntityRecord>, FetchError>,
    pub alerts: Result<Vec<Alert>, FetchError>,
}

pub struct FleetMonitor<S> {
    source: Arc<S>,
    current: Arc<FleetView>,
    tx: watch::Sender<Arc<FleetView>>,
}

impl<S: DataSource> FleetMonitor<S> {
    pub fn new(source: Arc<S>) -> Self {
        let current = Arc::new(FleetView::default());
        let (tx, _) = watch::channel(current.clone());
        Self {
            source,
            current,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FleetView>> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> Arc<FleetView> {
        self.current.clone()
    }
}

#[async_trait]
impl<S: DataSource> PollTarget for FleetMonitor<S> {
    type Fetched = FleetFetch;

    async fn fetch(&self, _cycle: CycleId) -> FleetFetch {
        let (entities, alerts) =
            tokio::join!(self.source.fetch_entities(), self.source.fetch_alerts());
        FleetFetch { entities, alerts }
    }

    fn apply(&mut self, cycle: CycleId, fetched: FleetFetch) -> CycleStatus {
        let mut status = CycleStatus::ok(cycle);
        let entities = settle(&mut status, FetchKind::Entities, fetched.entities);
        let alerts = settle(&mut status, FetchKind::Alerts, fetched.alerts);

        let next = if status.critical_failed {
            FleetView {
                status: Some(status.clone()),
                ..(*self.current).clone()
            }
        } else {
            let entities = entities.unwrap_or_else(|| self.current.entities.clone());
            let alerts = alerts.unwrap_or_else(|| self.current.alerts.clone());
            debug!(
                %cycle,
                entities = entities.len(),
                alerts = alerts.len(),
                "fleet updated"
            );
            FleetView {
                entities,
                alerts,
                status: Some(status.clone()),
            }
        };
        self.current = Arc::new(next);
        self.tx.send_replace(self.current.clone());
        status
    }

    fn teardown(&mut self) {
        info!("fleet view torn down");
    }
}

fn settle<T>(status: &mut CycleStatus, kind: FetchKind, result: Result<T, FetchError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            match kind.criticality() {
                Criticality::Critical => {
                    error!(cycle = %status.cycle, source = %kind, error = %e, "fleet fetch failed")
                }
                Criticality::NonCritical => {
                    warn!(cycle = %status.cycle, source = %kind, error = %e, "fleet fetch failed")
                }
            }
            status.record_failure(kind, e);
            None
        }
    }
}
