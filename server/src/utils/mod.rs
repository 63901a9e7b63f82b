//! Utility functions shared by the filter compiler and the CLI

pub mod file;
pub mod sql;
pub mod time;
