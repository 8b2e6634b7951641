use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// Out-of-band event channel for a capture session.
///
/// Keeps fault notification separate from the data callback, so a device
/// going away mid-capture is never confused with empty buffers.
///
/// Methods are called from lifecycle callers and from the dispatch thread,
/// never from the backend's real-time delivery thread. Implementations
/// should marshal to their own thread if they need to do real work.
pub trait SessionObserver: Send + Sync {
    /// Called after each state transition.
    fn on_state_changed(&self, state: SessionState);

    /// Called when a fault is detected inside the delivery path, e.g. the
    /// device disconnected or a process-scoped target stopped rendering.
    /// The session has already transitioned to `Stopped` when this fires.
    fn on_error(&self, error: &CaptureError);
}
