use crate::dispatch::sink::DeliverySink;
use crate::models::audio_models::{ApplicationInfo, AudioFormat};
use crate::models::error::CaptureError;

/// Interface for capture engine backends.
///
/// A backend owns the OS-facing half of one session: endpoint access,
/// format negotiation, and the real-time delivery thread. The session
/// drives it through this trait and never sees OS handles directly.
///
/// Implemented by:
/// - `NullBackend` (no-op fallback, scriptable for tests)
/// - platform interception backends (WASAPI loopback, PulseAudio monitor)
///   living outside this crate
pub trait CaptureBackend: Send {
    /// Whether the device subsystem behind this backend is reachable.
    ///
    /// Checked once at session creation; `false` fails `create` with
    /// `CaptureError::Allocation`.
    fn is_available(&self) -> bool;

    /// Open the default loopback/monitor endpoint and negotiate the PCM
    /// layout. Called exactly once per initialize.
    fn open_endpoint(&mut self) -> Result<AudioFormat, CaptureError>;

    /// Begin system-wide capture, pushing buffers into `sink` from a
    /// backend-owned delivery thread until `stop`.
    fn start(&mut self, sink: DeliverySink) -> Result<(), CaptureError>;

    /// Begin capture scoped to `pid`.
    ///
    /// Must fail with `CaptureError::ProcessNotFound` when the pid is not
    /// currently rendering audio; falling back to system-wide capture is the
    /// caller's decision, never the backend's.
    fn start_process(&mut self, pid: u32, sink: DeliverySink) -> Result<(), CaptureError>;

    /// Stop the delivery thread and drop its sink. Must be idempotent and
    /// must not return before the thread stops pushing.
    fn stop(&mut self);

    /// Snapshot the processes currently rendering audio, at most `max_count`
    /// entries. Truncation is silent; no match is an empty vector, not an
    /// error.
    fn list_applications(&mut self, max_count: usize) -> Result<Vec<ApplicationInfo>, CaptureError>;
}
