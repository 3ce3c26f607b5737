//! Command line interface

pub mod commands;
pub mod display;
pub mod fleet;

pub use commands::{CliArgs, Commands};
