//! AIAnalysis - root cause analysis controller
//!
//! Drives analysis resources through an investigation against an external
//! service, selects a remediation workflow, decides whether a human must
//! approve it, and records every step in an audit trail.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Analysis resource, audit and policy models, and port traits
//! - **Adapter Layer** (`adapters`): SQLite, HTTP and in-memory implementations of the ports
//! - **Service Layer** (`services`): Reconciler state machine, policy engine, audit emitter, controller
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use aianalysis::services::{AnalysisReconciler, Controller};
//!
//! let controller = Controller::new(reconciler, repository, audit, config.controller);
//! let report = controller.run(shutdown_rx).await;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    AIAnalysis, AnalysisRequest, AnalysisStatus, AuditEvent, AuditEventType, Config, Phase,
    PolicyDecision, PolicyInput, Reason, ResourceKey, SubReason,
};
pub use domain::ports::{
    AnalysisRepository, AuditStore, EventRecorder, InvestigationClient, PolicyEvaluator,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{AnalysisReconciler, AuditEmitter, Controller, PolicyEngine, WorkQueue};
