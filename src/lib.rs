//! Agent team API
//!
//! A simulated software team (manager, product manager, architect,
//! developer and QA agents) behind an HTTP API. The crate carries the
//! agents themselves plus their supporting machinery: context windows,
//! retrieval memory, sprint memory, evolution tracking, messaging,
//! cross-project allocation and project context switching.

pub mod agents;
pub mod allocation;
pub mod api;
pub mod auth;
pub mod communication;
pub mod config;
pub mod context;
pub mod domain;
pub mod evolution;
pub mod infrastructure;
pub mod memory;
pub mod project_context;
