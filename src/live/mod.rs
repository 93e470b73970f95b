//! Live log broker: one append-only log per job, fanned out to any number
//! of independent subscribers that each replay from the first line.

pub mod log;

pub use log::{replay, JobLog, LogEvent, LogEventStream, LogProgress};
