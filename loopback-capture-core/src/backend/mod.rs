pub mod null;

pub use null::NullBackend;

use crate::traits::capture_backend::CaptureBackend;

/// Select a capture backend for this process.
///
/// Platform interception backends (WASAPI loopback on Windows, PulseAudio
/// monitor sources on Linux) implement [`CaptureBackend`] in their own
/// crates and are injected into `CaptureSession::create` directly. When none
/// is available, the null backend keeps every call site runnable: sessions
/// negotiate a format and run their full lifecycle, delivering no audio.
pub fn default_backend() -> Box<dyn CaptureBackend> {
    Box::new(NullBackend::new())
}
