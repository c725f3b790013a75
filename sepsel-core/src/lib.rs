//! Sepsel Core: Data Plumbing for Learned Separator Configuration
//!
//! This crate holds the data side of the sepsel pipeline:
//! - **Timing traces**: per-(instance, configuration) solve-time records,
//!   read from CSV or JSONL with deterministic column negotiation
//! - **Configuration registry**: named separator toggle maps, loaded once
//!   per run and passed to every component that needs them
//! - **Delta matrix**: relative-improvement table over a baseline
//! - **Greedy selector**: restricted action sets via coverage maximization
//! - **Feature store**: index-aligned instance feature vectors
//! - **Offline evaluator**: policy quality by replay against a trace
//!
//! Model training and inference live in `sepsel-ml`; the CLI binary that
//! wires the stages together lives in `sepsel-cli`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod delta;
pub mod error;
pub mod features;
pub mod greedy;
pub mod offline;
pub mod registry;
pub mod trace;

pub use delta::DeltaMatrix;
pub use error::{Error, Result};
pub use features::{FeatureStore, NormStats};
pub use greedy::{ActionSetArtifact, GreedySelection, select_action_set};
pub use offline::{OfflineEvalRow, OfflineEvalSummary, PredictionRow};
pub use registry::{ConfigRegistry, SeparatorConfig};
pub use trace::{TimingRecord, normalize_instance_name};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Deltas are clipped to this magnitude before any downstream use.
pub const DELTA_CLIP: f64 = 1.5;
