// Operator accounts: the humans allowed to launch and steer projects

pub mod value_objects;

pub use value_objects::Email;
