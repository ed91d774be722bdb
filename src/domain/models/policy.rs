//! Approval policy input and decision.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::analysis::{DetectedLabels, TargetResource};

/// Everything the approval policy may look at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    pub environment: String,
    /// Resource the remediation would act on; `None` forces approval.
    pub affected_resource: Option<TargetResource>,
    pub confidence: f64,
    pub detected_labels: Option<DetectedLabels>,
    pub failed_detections: Vec<String>,
    pub warnings: Vec<String>,
    pub custom_labels: BTreeMap<String, Vec<String>>,
    /// 0 for a first attempt.
    pub recovery_attempt_number: u32,
}

/// Outcome of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub approval_required: bool,
    /// The policy was unavailable and a safe default was applied.
    pub degraded: bool,
    pub reason: String,
}

impl PolicyDecision {
    pub fn auto_approved(reason: impl Into<String>) -> Self {
        Self {
            approval_required: false,
            degraded: false,
            reason: reason.into(),
        }
    }

    pub fn requires_approval(reason: impl Into<String>) -> Self {
        Self {
            approval_required: true,
            degraded: false,
            reason: reason.into(),
        }
    }

    /// Fail-safe decision when no policy can be evaluated.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            approval_required: true,
            degraded: true,
            reason: reason.into(),
        }
    }
}
