// Outreach pipeline: run state, stage contracts, failure policy and the
// workflow engine that drives them.
// Stage implementations live in cv/, faculty/ and outreach/; the engine only
// sees the traits in stages.rs.

pub mod outcome;
pub mod scoring;
pub mod stages;
pub mod state;
pub mod workflow;

pub use outcome::StageError;
pub use workflow::{RunMode, RunReport, RunRequest, Workflow, WorkflowOptions, WorkflowStages};
