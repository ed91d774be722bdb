//! Investigation session regeneration.
//!
//! The investigation service may forget a session at any time. Each loss
//! is answered with a fresh submit until the regeneration budget is spent;
//! the generation counter only ever grows and never passes the cap.

use crate::domain::models::InvestigationSession;

/// What to do after the service reported a session as unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDecision {
    /// Submit again and track the new session under this generation.
    Regenerate { generation: u32 },
    /// The budget is spent; the analysis must fail.
    Exhausted { generation: u32 },
}

#[derive(Debug, Clone, Copy)]
pub struct SessionTracker {
    max_regenerations: u32,
}

impl SessionTracker {
    pub fn new(max_regenerations: u32) -> Self {
        Self { max_regenerations }
    }

    pub fn max_regenerations(&self) -> u32 {
        self.max_regenerations
    }

    pub fn on_session_lost(&self, session: &InvestigationSession) -> SessionDecision {
        if session.generation >= self.max_regenerations {
            SessionDecision::Exhausted {
                generation: session.generation,
            }
        } else {
            SessionDecision::Regenerate {
                generation: session.generation + 1,
            }
        }
    }

    /// Regenerations still available for `session`.
    pub fn remaining(&self, session: &InvestigationSession) -> u32 {
        self.max_regenerations.saturating_sub(session.generation)
    }
}
