//! Command implementations.

pub mod config;
pub mod process;
pub mod remote;
