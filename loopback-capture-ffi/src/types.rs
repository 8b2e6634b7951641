//! `repr(C)` mirrors of the core data models, shaped for ctypes/cgo callers.

use std::os::raw::{c_char, c_int, c_void};

/// Fixed capacity of [`CAudioAppInfo::name`], including the NUL terminator.
/// MAX_PATH-derived, matching the original bindings' 260-wide buffer.
pub const APP_NAME_CAP: usize = 260;

/// PCM layout out-param for `audio_capture_get_format`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CAudioFormat {
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
}

/// One entry of the caller-allocated array passed to
/// `audio_capture_get_applications`.
///
/// `name` is NUL-terminated UTF-8, truncated to fit.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct CAudioAppInfo {
    pub pid: u32,
    pub name: [c_char; APP_NAME_CAP],
}

/// Consumer callback crossing the C boundary.
///
/// Receives a pointer to interleaved 32-bit float samples, the frame count,
/// and the opaque user-data pointer registered alongside it. The buffer is
/// valid only for the duration of the call; the callee must copy anything it
/// wants to keep and must not block.
pub type CAudioCallback =
    Option<unsafe extern "C" fn(buffer: *const f32, frames: c_int, user_data: *mut c_void)>;
