//! Pipeline orchestration.
//!
//! The runner walks an ordered list of steps, loading each step's cached
//! artifact when present and recomputing otherwise. All cross-step state
//! lives in [`context::RunContext`]; steps never talk to each other
//! directly.

pub mod context;
pub mod runner;
pub mod stages;

pub use context::{RunContext, StageStats};
pub use runner::{RunOutcome, Step, StepRunner};
