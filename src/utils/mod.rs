//! Shared utilities for staging operations.

pub mod fs;
