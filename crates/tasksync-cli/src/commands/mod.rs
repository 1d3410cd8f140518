//! Command handlers

pub mod config;
pub mod shell;
pub mod sync;
pub mod task;
