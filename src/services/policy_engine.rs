//! Approval policy engine.
//!
//! The policy is a declarative YAML document compiled once per load and
//! shared read-only by every reconcile. Reloads swap the whole compiled
//! policy behind a lock so readers observe either the old or the new
//! policy. When no policy can be loaded every evaluation resolves to a
//! degraded decision that requires approval.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::models::{PolicyConfig, PolicyDecision, PolicyInput};
use crate::domain::ports::PolicyEvaluator;

/// Errors raised while loading a policy. They never reach the reconciler.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse policy file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid policy: {0}")]
    Invalid(String),
}

/// On-disk approval policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalPolicy {
    /// Environments held to production scrutiny
    pub production_environments: Vec<String>,

    /// Environments auto-approved unless a detection failed
    pub auto_approve_environments: Vec<String>,

    /// Overrides `policy.production_auto_approve_confidence` when set
    pub production_auto_approve_confidence: Option<f64>,

    /// Recovery attempts at or above this count always need approval
    pub max_recovery_attempts_before_approval: u32,

    /// Resource kinds that always need approval
    pub sensitive_kinds: Vec<String>,

    /// Custom label keys (and optionally values) that force approval.
    /// An empty value list matches any value.
    pub approval_required_custom_labels: BTreeMap<String, Vec<String>>,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            production_environments: vec!["production".to_string(), "prod".to_string()],
            auto_approve_environments: ["staging", "development", "dev", "qa", "test"]
                .into_iter()
                .map(String::from)
                .collect(),
            production_auto_approve_confidence: None,
            max_recovery_attempts_before_approval: 3,
            sensitive_kinds: [
                "Secret",
                "Node",
                "Namespace",
                "PersistentVolume",
                "ClusterRole",
                "ClusterRoleBinding",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            approval_required_custom_labels: BTreeMap::new(),
        }
    }
}

impl ApprovalPolicy {
    pub fn from_yaml(yaml: &str, path: &Path) -> Result<Self, PolicyError> {
        serde_yaml::from_str(yaml).map_err(|source| PolicyError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents, path)
    }
}

/// Policy ready for evaluation: lookups normalised to lowercase.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    production_environments: HashSet<String>,
    auto_approve_environments: HashSet<String>,
    production_auto_approve_confidence: f64,
    max_recovery_attempts_before_approval: u32,
    sensitive_kinds: HashSet<String>,
    approval_required_custom_labels: BTreeMap<String, Vec<String>>,
}

fn lowercase_set(values: &[String]) -> HashSet<String> {
    values.iter().map(|v| v.trim().to_lowercase()).collect()
}

impl CompiledPolicy {
    /// `default_production_confidence` applies when the policy file does
    /// not set its own threshold.
    pub fn compile(
        policy: &ApprovalPolicy,
        default_production_confidence: f64,
    ) -> Result<Self, PolicyError> {
        let confidence = policy
            .production_auto_approve_confidence
            .unwrap_or(default_production_confidence);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PolicyError::Invalid(format!(
                "production_auto_approve_confidence {confidence} is outside 0.0-1.0"
            )));
        }

        let production = lowercase_set(&policy.production_environments);
        let auto_approve = lowercase_set(&policy.auto_approve_environments);
        if let Some(env) = production.intersection(&auto_approve).next() {
            return Err(PolicyError::Invalid(format!(
                "environment '{env}' is listed as both production and auto-approve"
            )));
        }
        if policy.max_recovery_attempts_before_approval == 0 {
            return Err(PolicyError::Invalid(
                "max_recovery_attempts_before_approval must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            production_environments: production,
            auto_approve_environments: auto_approve,
            production_auto_approve_confidence: confidence,
            max_recovery_attempts_before_approval: policy.max_recovery_attempts_before_approval,
            sensitive_kinds: lowercase_set(&policy.sensitive_kinds),
            approval_required_custom_labels: policy.approval_required_custom_labels.clone(),
        })
    }

    pub fn production_auto_approve_confidence(&self) -> f64 {
        self.production_auto_approve_confidence
    }

    /// Every rule is checked independently; any match requires approval
    /// and contributes to the reason.
    pub fn evaluate(&self, input: &PolicyInput) -> PolicyDecision {
        let mut reasons: Vec<String> = Vec::new();
        let environment = input.environment.trim().to_lowercase();

        match &input.affected_resource {
            None => reasons
                .push("No affected resource identified; approval required by default".to_string()),
            Some(resource) => {
                if self.sensitive_kinds.contains(&resource.kind.to_lowercase()) {
                    reasons.push(format!(
                        "Remediation targets sensitive resource {}/{}",
                        resource.kind, resource.name
                    ));
                }
            }
        }

        if input
            .detected_labels
            .as_ref()
            .is_some_and(|labels| labels.stateful)
        {
            reasons.push("Stateful workload requires approval".to_string());
        }

        if input.recovery_attempt_number >= self.max_recovery_attempts_before_approval {
            reasons.push(format!(
                "Recovery attempt {} reached the escalation threshold ({})",
                input.recovery_attempt_number, self.max_recovery_attempts_before_approval
            ));
        }

        if self.production_environments.contains(&environment) {
            if input.confidence < self.production_auto_approve_confidence {
                reasons.push(format!(
                    "Production confidence {:.2} is below the auto-approve threshold {:.2}",
                    input.confidence, self.production_auto_approve_confidence
                ));
            }
            if !input.failed_detections.is_empty() {
                reasons.push(format!(
                    "Production with failed detections: {}",
                    input.failed_detections.join(", ")
                ));
            }
            if !input.warnings.is_empty() {
                reasons.push(format!(
                    "Production with {} investigation warning(s)",
                    input.warnings.len()
                ));
            }
        } else if self.auto_approve_environments.contains(&environment) {
            if !input.failed_detections.is_empty() {
                reasons.push(format!(
                    "Failed detections: {}",
                    input.failed_detections.join(", ")
                ));
            }
        } else {
            reasons.push(format!(
                "Environment '{}' is not covered by an auto-approval rule",
                input.environment
            ));
        }

        for (key, required_values) in &self.approval_required_custom_labels {
            let Some(values) = input.custom_labels.get(key) else {
                continue;
            };
            if required_values.is_empty() || values.iter().any(|v| required_values.contains(v)) {
                reasons.push(format!("Custom label '{key}' requires approval"));
            }
        }

        if reasons.is_empty() {
            PolicyDecision::auto_approved(format!(
                "Auto-approved by {} environment policy",
                input.environment
            ))
        } else {
            PolicyDecision::requires_approval(reasons.join("; "))
        }
    }
}

#[derive(Debug)]
enum PolicyState {
    Active(Arc<CompiledPolicy>),
    Unavailable { reason: String },
}

/// Hot-reloadable [`PolicyEvaluator`].
pub struct PolicyEngine {
    path: Option<PathBuf>,
    default_production_confidence: f64,
    state: RwLock<Arc<PolicyState>>,
}

impl PolicyEngine {
    /// Load the policy named by `config`.
    ///
    /// A missing or broken file leaves the engine in degraded mode rather
    /// than failing startup; a later reload can bring it back.
    pub fn load(config: &PolicyConfig) -> Self {
        let engine = Self {
            path: Some(PathBuf::from(&config.path)),
            default_production_confidence: config.production_auto_approve_confidence,
            state: RwLock::new(Arc::new(PolicyState::Unavailable {
                reason: "policy not loaded".to_string(),
            })),
        };
        if let Err(err) = engine.reload() {
            warn!(path = %config.path, error = %err, "approval policy unavailable, running degraded");
        }
        engine
    }

    /// Engine over an in-memory policy; `reload` is a no-op.
    pub fn from_policy(
        policy: &ApprovalPolicy,
        default_production_confidence: f64,
    ) -> Result<Self, PolicyError> {
        let compiled = CompiledPolicy::compile(policy, default_production_confidence)?;
        Ok(Self {
            path: None,
            default_production_confidence,
            state: RwLock::new(Arc::new(PolicyState::Active(Arc::new(compiled)))),
        })
    }

    /// Engine that always answers in degraded mode.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            path: None,
            default_production_confidence: 0.0,
            state: RwLock::new(Arc::new(PolicyState::Unavailable {
                reason: reason.into(),
            })),
        }
    }

    fn snapshot(&self) -> Arc<PolicyState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap(&self, next: PolicyState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Re-read the policy file.
    ///
    /// On failure an active policy stays in place; an engine that was
    /// already unavailable records the new reason.
    pub fn reload(&self) -> Result<(), PolicyError> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };

        let compiled = ApprovalPolicy::load_file(path)
            .and_then(|policy| CompiledPolicy::compile(&policy, self.default_production_confidence));

        match compiled {
            Ok(compiled) => {
                info!(
                    path = %path.display(),
                    production_confidence = compiled.production_auto_approve_confidence(),
                    "approval policy loaded"
                );
                self.swap(PolicyState::Active(Arc::new(compiled)));
                Ok(())
            }
            Err(err) => {
                if matches!(*self.snapshot(), PolicyState::Unavailable { .. }) {
                    self.swap(PolicyState::Unavailable {
                        reason: err.to_string(),
                    });
                } else {
                    warn!(path = %path.display(), error = %err, "policy reload failed, keeping previous policy");
                }
                Err(err)
            }
        }
    }

    fn file_modified(&self) -> Option<SystemTime> {
        let path = self.path.as_deref()?;
        std::fs::metadata(path).and_then(|m| m.modified()).ok()
    }

    /// Reload whenever the file's modification time changes.
    pub fn spawn_watcher(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_seen = self.file_modified();
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let current = self.file_modified();
                        if current == last_seen {
                            continue;
                        }
                        last_seen = current;
                        debug!("approval policy file changed");
                        if let Err(err) = self.reload() {
                            warn!(error = %err, "approval policy reload failed");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("policy watcher stopped");
        })
    }
}

impl PolicyEvaluator for PolicyEngine {
    fn evaluate(&self, input: &PolicyInput) -> PolicyDecision {
        match &*self.snapshot() {
            PolicyState::Active(policy) => policy.evaluate(input),
            PolicyState::Unavailable { reason } => PolicyDecision::degraded(format!(
                "Approval policy unavailable ({reason}); approval required"
            )),
        }
    }

    fn is_available(&self) -> bool {
        matches!(*self.snapshot(), PolicyState::Active(_))
    }
}
