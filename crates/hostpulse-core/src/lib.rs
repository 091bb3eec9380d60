//! hostpulse-core: client-side telemetry pipeline for remote machine monitoring.
//!
//! Provides:
//! - `model`: wire and normalized data types (snapshots, machines, tickets, alerts)
//! - `util`: timestamp normalization
//! - `rates`: counter-to-rate derivation with reset and skew guards
//! - `window`: bounded per-machine sample windows with cached derived series
//! - `scheduler`: self-paced, non-overlapping poll loop with cycle generations
//! - `engine`: composition root owning the windows, producing read-only views
//! - `monitor`: detail and overview poll targets publishing over `watch` channels
//! - `source`: data source abstraction and an in-memory mock
//! - `fmt`: formatting helpers for tiles and listings

pub mod engine;
pub mod fmt;
pub mod model;
pub mod monitor;
pub mod rates;
pub mod scheduler;
pub mod source;
pub mod util;
pub mod window;

pub use engine::{EngineConfig, EntityView, MetricsEngine};
pub use scheduler::{PollConfig, PollScheduler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
