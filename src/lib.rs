//! Lantern runs third-party vulnerability scanners against a set of targets,
//! merges their output into one live log, normalizes what they report into
//! findings, and fires saved scans on a cron schedule.

pub mod api;
pub mod cli;
pub mod config;
pub mod db;
pub mod errors;
pub mod live;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reporting;
pub mod scheduler;
pub mod tools;

pub use errors::LanternError;
pub use pipeline::ScanEngine;
