//! File system operations.

pub mod walker;
