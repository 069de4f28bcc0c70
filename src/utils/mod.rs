//! The `utils` module provides shared pieces used across the relay:
//! process-level error types and tracing initialization.

pub mod error;
pub mod logging;
