// Task domain module

#![allow(clippy::module_inception)]

pub mod task;
pub mod value_objects;

pub use task::Task;
pub use value_objects::TaskStatus;
