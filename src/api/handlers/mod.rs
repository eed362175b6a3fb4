pub mod agents;
pub mod auth;
pub mod health;
pub mod knowledge;
pub mod memory;
pub mod projects;
pub mod sprints;
