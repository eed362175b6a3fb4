// Project domain module
// Project aggregate root, its status value object and domain events

#![allow(clippy::module_inception)]

pub mod events;
pub mod project;
pub mod value_objects;

pub use events::ProjectEvent;
pub use project::{Project, MAX_BUDGET};
pub use value_objects::ProjectStatus;
