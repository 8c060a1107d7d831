//! CourtView Deterministic Simulation Testing (DST) Harness
//!
//! This crate provides a controlled environment where the whole broadcast
//! pipeline runs deterministically: a detector, the orchestrator, the hub
//! and any number of subscribers.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when the pipeline sleeps
//! - **Subscribers**: Channels with injectable faults (sever, fail after N)
//! - **Randomness**: Player motion, pixel noise and track colors all derive
//!   from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌────────────┐    ┌───────────────────┐    ┌───────────┐   │
//! │  │   Oracle   │───►│ SyntheticDetector │───►│ Pipeline  │   │
//! │  │ (players)  │    │ (inverse homog.)  │    │           │   │
//! │  └────────────┘    └───────────────────┘    └─────┬─────┘   │
//! │                                                   │         │
//! │                                             BroadcastHub    │
//! │                                          ┌────────┼───────┐ │
//! │                                          ▼        ▼       ▼ │
//! │                                       SimSink  SimSink  ... │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use courtview_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::LateJoiner).await;
//! assert!(result.passed);
//! ```

mod context;
mod detector;
mod oracle;
mod runner;
mod sink;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use detector::{GroundTruthLog, ScriptedDetector, SyntheticDetector};
pub use oracle::{CourtPlayer, Oracle};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
pub use sink::{sim_subscriber, SimSink, SimSinkController};
pub use world::{SimConfig, SimWorld};
