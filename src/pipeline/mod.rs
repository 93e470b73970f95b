//! Job lifecycle: creation, supervision, and the in-process registry of
//! jobs that have not yet been handed off to storage.

pub mod engine;
pub mod job;
pub mod registry;
pub mod runner;

pub use engine::ScanEngine;
pub use job::ActiveJob;
pub use registry::JobRegistry;
pub use runner::{JobRunner, RunnerSettings};
