pub mod definitions;
pub mod exports;
pub mod health;
pub mod jobs;
pub mod stats;
pub mod stream;
pub mod templates;
