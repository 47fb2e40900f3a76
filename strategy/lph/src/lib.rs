//! LP Hedging strategy crate.
//!
//! Keeps a concentrated-liquidity LP position delta-neutral against a perp
//! short: snapshot, exposure, decision, execution, state.

pub mod adapters;
pub mod config;
mod error;
pub mod exposure;
mod lph;
pub mod policy;
pub mod provider;
mod sequencer;
mod snapshot;
pub mod state;
mod types;

pub use config::{ExecutionConfig, HedgePolicyConfig, LPHStrategyConfig, TrackerConfig};
pub use error::HedgeError;
pub use lph::{Collaborators, LPHStrategy};
pub use sequencer::Sequencer;
pub use snapshot::SnapshotBuilder;
pub use state::{DataHealth, HedgeState, SnapshotHistory};
pub use types::{
    AbortKind, ActionKind, ActionRecord, CycleReport, DataSource, DegradedReason,
    ExecutionOutcome, ExposureResult, HedgeAction, HedgeEvent, Mode, MonitoringSnapshot,
    PositionSnapshot, ReasonCode,
};
