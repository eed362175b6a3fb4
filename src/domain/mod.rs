// Domain layer module exports
// Aggregates and repository ports; nothing here knows about Postgres or HTTP

pub mod agent;
pub mod knowledge;
pub mod operator;
pub mod project;
pub mod repositories;
pub mod sprint;
pub mod task;
