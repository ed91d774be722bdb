//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty formatting
//! - Optional rolling file output via tracing-appender
pub mod config;
pub mod logger;

pub use config::{LogFormat, RotationPolicy};
pub use logger::LoggerImpl;
