//! Utility functions

pub mod shutdown;
pub mod time;
