pub mod connection;
pub mod definitions;
pub mod findings;
pub mod jobs;
pub mod logs;
pub mod schema;
pub mod store;

pub use connection::Database;
pub use store::JobStore;
