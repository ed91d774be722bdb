//! Adapters implementing the domain ports.

pub mod data_storage;
pub mod events;
pub mod investigation;
pub mod memory;
pub mod sqlite;

pub use data_storage::HttpAuditStore;
pub use events::{InMemoryEventRecorder, TracingEventRecorder};
pub use investigation::{HttpInvestigationClient, MockInvestigationClient, MockScenario, RetryPolicy};
pub use memory::{InMemoryAnalysisRepository, InMemoryAuditStore};
pub use sqlite::{SqliteAnalysisRepository, SqliteAuditStore};
