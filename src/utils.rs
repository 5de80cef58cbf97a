//! Ambient utilities: configuration loading and logging.

pub mod config;
pub mod logging;
