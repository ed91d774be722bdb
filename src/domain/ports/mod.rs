//! Port trait definitions (Hexagonal Architecture)
//!
//! Adapters implement these traits so the reconciler stays independent of
//! storage, transport and event delivery:
//! - AnalysisRepository: status store with optimistic concurrency
//! - InvestigationClient: submit/poll protocol against the investigation service
//! - AuditStore: durable audit trail
//! - PolicyEvaluator: approval policy
//! - EventRecorder: per-resource event stream

pub mod analysis_repository;
pub mod audit_store;
pub mod errors;
pub mod event_recorder;
pub mod investigation_client;
pub mod policy_evaluator;

pub use analysis_repository::{AnalysisFilter, AnalysisRepository};
pub use audit_store::{AuditQuery, AuditStore};
pub use errors::{AuditStoreError, InvestigationError, RepositoryError};
pub use event_recorder::EventRecorder;
pub use investigation_client::InvestigationClient;
pub use policy_evaluator::PolicyEvaluator;
