//! Report output.

pub mod export;
