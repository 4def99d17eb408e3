//! CLI command implementations
//!
//! Each command is implemented in its own module.

pub mod check;
pub mod send;
