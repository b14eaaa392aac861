pub mod core;
pub mod node;
pub mod proposals;
pub mod rotation;
pub mod voting;
