// Run API: start, inspect, list and cancel pipeline runs.
// The engine never touches storage; these handlers persist its final report.

pub mod handlers;
pub mod registry;
pub mod store;

pub use registry::RunRegistry;
