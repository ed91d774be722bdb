use crate::domain::models::{PolicyDecision, PolicyInput};

/// Approval policy port.
///
/// Evaluation never fails: an unavailable policy yields a degraded
/// decision that requires approval.
pub trait PolicyEvaluator: Send + Sync {
    fn evaluate(&self, input: &PolicyInput) -> PolicyDecision;

    /// Whether a compiled policy is currently loaded
    fn is_available(&self) -> bool;
}
