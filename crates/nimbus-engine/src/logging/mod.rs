//! Logging utilities.
//!
//! This module centralizes logger initialization. It only commits to the
//! standard `log` facade; `env_logger` is the chosen backend but nothing
//! else in the workspace depends on that choice.

mod init;

pub use init::{init_logging, LoggingConfig};
