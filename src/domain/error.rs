use thiserror::Error;

use super::models::analysis::Phase;

/// Domain-level errors for analysis operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidPhaseTransition { from: Phase, to: Phase },

    #[error("Analysis is in terminal phase: {0}")]
    TerminalPhase(Phase),

    #[error("Invalid confidence: {0} (must be within 0.0-1.0)")]
    InvalidConfidence(f64),

    #[error("Invalid analysis request: {0}")]
    InvalidRequest(String),
}

