//! # loopback-capture-ffi
//!
//! C ABI surface for loopback-capture-kit, built as a `cdylib` so foreign
//! bindings (Python ctypes, Go cgo) can drive the capture engine.
//!
//! ## Exported functions
//!
//! | Function | Inputs | Output |
//! |---|---|---|
//! | `audio_capture_create` | — | opaque handle, null on failure |
//! | `audio_capture_initialize` | handle | 1/0 |
//! | `audio_capture_start` | handle | 1/0 |
//! | `audio_capture_start_process` | handle, pid | 1/0 |
//! | `audio_capture_stop` | handle | — (idempotent) |
//! | `audio_capture_destroy` | handle | — (frees the handle) |
//! | `audio_capture_set_callback` | handle, callback, user_data | — |
//! | `audio_capture_get_format` | handle, out format | 1/0 |
//! | `audio_capture_get_applications` | handle, out array, max_count | count written |
//! | `audio_capture_dropped_buffers` | handle | counter |
//!
//! The consumer callback fires on the session's dispatch thread with a
//! buffer that is only valid for the duration of the call. It must copy what
//! it keeps, return promptly, and never call back into the lifecycle
//! functions for its own handle.

pub mod exports;
pub mod types;

pub use exports::CaptureHandle;
pub use types::{CAudioAppInfo, CAudioCallback, CAudioFormat, APP_NAME_CAP};
