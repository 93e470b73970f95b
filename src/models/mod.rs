pub mod definition;
pub mod finding;
pub mod job;
pub mod policy;
pub mod target;
pub mod templates;
pub mod tool;

pub use definition::*;
pub use finding::*;
pub use job::*;
pub use policy::*;
pub use target::*;
pub use tool::*;
