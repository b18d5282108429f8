//! Command implementation modules

pub mod reshape;

pub use reshape::run_reshape_command;
