//! Reliable bulk operations over an RCON console.
//!
//! A [`CommandExecutor`] turns the one-command-at-a-time text protocol into
//! classified, retried [`CommandResult`]s. [`AdaptiveBatcher`] splits large
//! fills into server-sized chunks, [`VerificationProbe`] reads writes back,
//! and [`WorkflowOrchestrator`] composes them into the operator workflows
//! `clear_environment` and `lock_world_time`.

pub mod batcher;
pub mod blocks;
pub mod classify;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod metrics;
pub mod planner;
pub mod registry;
pub mod report;
pub mod snapshot;
pub mod transport;
pub mod verify;
pub mod workflow;
pub mod world_time;

#[cfg(test)]
mod testing;

pub use batcher::{AdaptiveBatcher, BatchRun, ChunkSizeState, FillJob, StopHandle};
pub use blocks::{BlockCategory, BlockId, ClassificationTable};
pub use classify::{ClassificationRule, Outcome, ResponseClassifier, RuleSpec};
pub use commands::ConsoleCommand;
pub use config::{BatchConfig, ConfigError, OpsConfig, RetryPolicy, VerificationConfig};
pub use error::{CommandError, ErrorKind, ValidationError};
pub use executor::{CommandExecutor, CommandResult, ExecOptions, ExecutorCounters};
pub use geometry::{BlockPos, Region};
pub use metrics::PerformanceStats;
pub use planner::{ClearAction, ClearPlan, TerrainPlanner};
pub use registry::{Area, InMemoryRegistry, StoreError, StructureFootprint, StructureKind, StructureRegistry, Volume};
pub use report::{ClearReport, ReportStatus, TimeLockReport};
pub use snapshot::{InMemorySnapshot, TerrainSnapshot};
pub use transport::{Connection, ConnectionState, RconTransport, Transport, TransportError};
pub use verify::{Expectation, VerificationProbe};
pub use workflow::WorkflowOrchestrator;
pub use world_time::{LockPhase, TimeOfDay};
