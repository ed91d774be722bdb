//! Events attached to an analysis resource for operators watching it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::analysis::ResourceKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventReason {
    AIAnalysisCreated,
    SessionCreated,
    SessionLost,
    SessionRegenerationExceeded,
    InvestigationComplete,
    AnalysisCompleted,
    AnalysisFailed,
    HumanReviewRequired,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AIAnalysisCreated => "AIAnalysisCreated",
            Self::SessionCreated => "SessionCreated",
            Self::SessionLost => "SessionLost",
            Self::SessionRegenerationExceeded => "SessionRegenerationExceeded",
            Self::InvestigationComplete => "InvestigationComplete",
            Self::AnalysisCompleted => "AnalysisCompleted",
            Self::AnalysisFailed => "AnalysisFailed",
            Self::HumanReviewRequired => "HumanReviewRequired",
        }
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Self::SessionLost
            | Self::SessionRegenerationExceeded
            | Self::AnalysisFailed
            | Self::HumanReviewRequired => EventType::Warning,
            _ => EventType::Normal,
        }
    }
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub key: ResourceKey,
    pub event_type: EventType,
    pub reason: EventReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ResourceEvent {
    pub fn new(key: ResourceKey, reason: EventReason, message: impl Into<String>) -> Self {
        Self {
            key,
            event_type: reason.event_type(),
            reason,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
