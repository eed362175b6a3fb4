// Agent domain module
// Stored agent profiles, their outputs, and the role/status value objects

#![allow(clippy::module_inception)]

pub mod agent;
pub mod output;
pub mod value_objects;

pub use agent::AgentProfile;
pub use output::AgentOutput;
pub use value_objects::{AgentRole, AgentStatus};
