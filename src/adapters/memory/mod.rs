//! In-memory adapters for tests and single-process runs.

pub mod analysis_repository;
pub mod audit_store;

pub use analysis_repository::InMemoryAnalysisRepository;
pub use audit_store::InMemoryAuditStore;
