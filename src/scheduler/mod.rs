//! Cron-driven firing of saved scan definitions.

pub mod cron;
pub mod service;

pub use cron::CronExpr;
pub use service::{spawn_scheduler, JobLauncher, SchedulerLoop, TickReport};
