//! mindstream engine - live synthetic telemetry for a simulated system
//!
//! Architecture:
//! - LogGenerator: weighted component/level/template draws, placeholders filled per entry
//! - MetricWalker: bounded random walk per metric, clamped to its range
//! - Ticker: one jittered tokio timer per stream, cancelled by token
//! - StreamEngine: owns the streams and the run state machine, broadcasts events
//!
//! Ring buffers, filtering and export live in `mindstream-core`.

pub mod config;
pub mod engine;
pub mod generator;
pub mod run;
pub mod template;
pub mod ticker;
pub mod walker;

pub use config::{ComponentConfig, EngineConfig, LogStreamConfig, MetricStreamConfig, RunConfig, TickInterval};
pub use engine::{EngineEvent, StreamEngine};
pub use generator::{LogGenerator, PlaceholderKind};
pub use run::{Run, RunState};
pub use walker::{MetricRange, MetricWalker};
