pub mod audit_emitter;
pub mod controller;
pub mod policy_engine;
pub mod reconciler;
pub mod session;
pub mod work_queue;

pub use audit_emitter::{AuditEmitter, AuditEmitterConfig, AuditEmitterError, AuditStats, FlushReport};
pub use controller::{Controller, ShutdownReport};
pub use policy_engine::{ApprovalPolicy, CompiledPolicy, PolicyEngine, PolicyError};
pub use reconciler::{AnalysisReconciler, ReconcileError, ReconcileOutcome, ReconcilerConfig};
pub use session::{SessionDecision, SessionTracker};
pub use work_queue::WorkQueue;
