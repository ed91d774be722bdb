use crate::domain::models::ResourceEvent;

/// Sink for events attached to an analysis resource.
///
/// Recording is fire-and-forget and must not block the reconciler.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: ResourceEvent);
}
