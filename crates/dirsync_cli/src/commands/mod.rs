//! CLI command implementations.

pub mod analyze;
pub mod compare;
pub mod serve;
pub mod transfer;
