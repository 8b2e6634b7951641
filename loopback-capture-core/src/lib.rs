//! # loopback-capture-core
//!
//! Platform-agnostic core of a system/application audio capture engine.
//!
//! Provides the capture session lifecycle, format negotiation snapshot,
//! audio-session (application) enumeration, and bounded-queue buffer
//! dispatch. Platform backends (Windows WASAPI loopback, Linux PulseAudio
//! monitor) implement the `CaptureBackend` trait and plug into the generic
//! `CaptureSession`; with no platform backend compiled in, the `NullBackend`
//! keeps the full lifecycle runnable.
//!
//! ## Architecture
//!
//! ```text
//! loopback-capture-core (this crate)
//! ├── traits/       ← CaptureBackend, SessionObserver
//! ├── models/       ← CaptureError, SessionState, AudioFormat, ApplicationInfo, ...
//! ├── dispatch/     ← CaptureDispatcher, DeliverySink (bounded-queue delivery)
//! ├── backend/      ← NullBackend, backend selection
//! └── session/      ← CaptureSession (lifecycle state machine)
//! ```
//!
//! ## Delivery model
//!
//! A backend pushes captured PCM from its own real-time delivery thread into
//! a bounded queue; the session's dispatch thread drains it and invokes the
//! single registered consumer callback, in capture order, one invocation at
//! a time. A full queue rejects the newest buffer (counted, logged). The
//! callback must not block: it backpressures the queue, and it must never
//! call lifecycle operations on its own session.

pub mod backend;
pub mod dispatch;
pub mod models;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backend::{default_backend, NullBackend};
pub use dispatch::dispatcher::{BufferCallback, CaptureDispatcher};
pub use dispatch::sink::DeliverySink;
pub use models::audio_models::{
    ApplicationInfo, AudioBuffer, AudioFormat, SessionDiagnostics, MAX_APP_NAME_LEN,
};
pub use models::config::SessionConfig;
pub use models::error::CaptureError;
pub use models::state::{SessionState, TargetMode};
pub use session::capture::CaptureSession;
pub use traits::capture_backend::CaptureBackend;
pub use traits::session_observer::SessionObserver;
