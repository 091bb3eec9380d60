//! Data source abstraction for the remote monitoring service.
//!
//! The engine never talks to the network itself. Everything it ingests comes
//! through [`DataSource`], which lets the live HTTP client and the in-memory
//! [`MockSource`] be swapped freely.

pub mod mock;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Alert, EntityId, EntityRecord, RawSnapshot, Ticket};

pub use mock::MockSource;

/// Error returned by a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, timeout...
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered with a non-success status.
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },
    /// The payload did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
    /// The source is known to be unavailable (used by test doubles).
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Whether a fetch failure blocks the rest of its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// Failure aborts the cycle's ingestion.
    Critical,
    /// Failure is isolated; previously shown data stays.
    NonCritical,
}

/// The individual fetch operations a cycle can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchKind {
    /// Static attributes of one machine (detail view).
    Entity,
    /// Recent snapshots of one machine (detail view).
    Snapshots,
    /// Secondary list for one machine, e.g. tickets (detail view).
    Auxiliary,
    /// All machines (overview).
    Entities,
    /// Unresolved alerts (overview).
    Alerts,
}

impl FetchKind {
    pub fn criticality(&self) -> Criticality {
        match self {
            FetchKind::Entity | FetchKind::Entities | FetchKind::Alerts => Criticality::Critical,
            FetchKind::Snapshots | FetchKind::Auxiliary => Criticality::NonCritical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchKind::Entity => "entity",
            FetchKind::Snapshots => "snapshots",
            FetchKind::Auxiliary => "auxiliary",
            FetchKind::Entities => "entities",
            FetchKind::Alerts => "alerts",
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to the remote monitoring service.
///
/// Implementations must be cheap to call repeatedly; the poll loop calls
/// every method once per cycle.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Static attributes of one machine.
    async fn fetch_entity(&self, id: EntityId) -> Result<EntityRecord, FetchError>;

    /// Up to `limit` most recent snapshots, in the service's order
    /// (newest first for the remote API).
    async fn fetch_snapshots(
        &self,
        id: EntityId,
        limit: usize,
    ) -> Result<Vec<RawSnapshot>, FetchError>;

    /// Tickets attached to one machine.
    async fn fetch_auxiliary(&self, id: EntityId) -> Result<Vec<Ticket>, FetchError>;

    /// All monitored machines.
    async fn fetch_entities(&self) -> Result<Vec<EntityRecord>, FetchError>;

    /// Unresolved alerts across all machines.
    async fn fetch_alerts(&self) -> Result<Vec<Alert>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criticality_by_kind() {
        assert_eq!(FetchKind::Entity.criticality(), Criticality::Critical);
        assert_eq!(FetchKind::Snapshots.criticality(), Criticality::NonCritical);
        assert_eq!(FetchKind::Auxiliary.criticality(), Criticality::NonCritical);
        assert_eq!(FetchKind::Entities.criticality(), Criticality::Critical);
        assert_eq!(FetchKind::Alerts.criticality(), Criticality::Critical);
    }

    #[test]
    fn fetch_error_display() {
        let e = FetchError::Status {
            status: 404,
            message: "System not found".into(),
        };
        assert_eq!(e.to_string(), "unexpected status 404: System not found");
        assert_eq!(FetchKind::Snapshots.to_string(), "snapshots");
    }
}
