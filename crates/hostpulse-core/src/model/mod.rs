//! Data model for monitored entities and their telemetry.
//!
//! Two layers are kept apart:
//! - wire types (`RawSnapshot`, `EntityRecord`, `Ticket`, `Alert`) mirror the
//!   JSON served by the remote monitoring API and are deserialized leniently;
//! - `Snapshot` is the normalized, UTC-anchored form the engine works with.

mod entity;
mod snapshot;

pub use entity::{Alert, EntityId, EntityRecord, Ticket};
pub use snapshot::{MalformedSnapshot, MetricKey, RawSnapshot, Snapshot, TopProcess};
