//! Domain layer for the analysis controller
//!
//! This module contains the analysis resource model, audit and policy
//! types, and the port traits infrastructure adapters implement.

pub mod error;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use error::AnalysisError;
