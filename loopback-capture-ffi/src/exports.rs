//! The exported C ABI.
//!
//! Every lifecycle function reports failure through its return value (1 =
//! success, 0 = failure, null = allocation failure); errors never unwind
//! across the boundary. Handles are exclusively owned by the caller that
//! created them and must be released with exactly one `audio_capture_destroy`.

use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::Arc;

use loopback_capture_core::{backend, AudioBuffer, CaptureSession};

use crate::types::{CAudioAppInfo, CAudioCallback, CAudioFormat, APP_NAME_CAP};

/// Opaque session handle handed across the C boundary.
pub struct CaptureHandle {
    session: CaptureSession,
}

impl CaptureHandle {
    /// Box a session into a raw handle, e.g. to expose a custom backend
    /// through this ABI.
    pub fn into_raw(session: CaptureSession) -> *mut CaptureHandle {
        Box::into_raw(Box::new(CaptureHandle { session }))
    }
}

/// Opaque user-data pointer captured into the callback closure.
///
/// SAFETY: the pointer is never dereferenced on this side of the boundary;
/// the caller guarantees whatever it points to is valid and usable from the
/// dispatch thread for as long as the callback stays registered.
struct UserData(*mut c_void);
unsafe impl Send for UserData {}
unsafe impl Sync for UserData {}

impl UserData {
    /// Reading the pointer through a method keeps closures capturing the
    /// wrapper itself, not the raw pointer field (which closure capture
    /// would otherwise disjoint out, losing the Send/Sync impls).
    fn as_ptr(&self) -> *mut c_void {
        self.0
    }
}

fn session<'a>(handle: *mut CaptureHandle) -> Option<&'a CaptureSession> {
    // SAFETY: non-null handles originate from `audio_capture_create` /
    // `into_raw` and stay valid until `audio_capture_destroy`.
    unsafe { handle.as_ref().map(|h| &h.session) }
}

/// Allocate a new capture session in uninitialized state.
///
/// Returns null when the device subsystem cannot be reached.
#[no_mangle]
pub extern "C" fn audio_capture_create() -> *mut CaptureHandle {
    match CaptureSession::create(backend::default_backend()) {
        Ok(session) => CaptureHandle::into_raw(session),
        Err(error) => {
            log::error!("audio_capture_create failed: {error}");
            ptr::null_mut()
        }
    }
}

/// Open the default endpoint and negotiate the capture format.
#[no_mangle]
pub extern "C" fn audio_capture_initialize(handle: *mut CaptureHandle) -> c_int {
    let Some(session) = session(handle) else {
        return 0;
    };
    match session.initialize() {
        Ok(()) => 1,
        Err(error) => {
            log::error!("audio_capture_initialize failed: {error}");
            0
        }
    }
}

/// Begin system-wide capture.
#[no_mangle]
pub extern "C" fn audio_capture_start(handle: *mut CaptureHandle) -> c_int {
    let Some(session) = session(handle) else {
        return 0;
    };
    match session.start() {
        Ok(()) => 1,
        Err(error) => {
            log::error!("audio_capture_start failed: {error}");
            0
        }
    }
}

/// Begin capture scoped to `pid`. Fails (0) when the process is not
/// currently rendering audio; no automatic system-wide fallback.
#[no_mangle]
pub extern "C" fn audio_capture_start_process(handle: *mut CaptureHandle, pid: u32) -> c_int {
    let Some(session) = session(handle) else {
        return 0;
    };
    match session.start_process(pid) {
        Ok(()) => 1,
        Err(error) => {
            log::error!("audio_capture_start_process({pid}) failed: {error}");
            0
        }
    }
}

/// Stop capturing. Idempotent; queued buffers are delivered before this
/// returns, and none after.
#[no_mangle]
pub extern "C" fn audio_capture_stop(handle: *mut CaptureHandle) {
    if let Some(session) = session(handle) {
        let _ = session.stop();
    }
}

/// Destroy the session and free the handle. The handle must not be used
/// afterwards. Waits for any in-flight callback invocation to finish.
#[no_mangle]
pub extern "C" fn audio_capture_destroy(handle: *mut CaptureHandle) {
    if handle.is_null() {
        return;
    }
    // SAFETY: ownership transfers back; caller promises a single destroy.
    let boxed = unsafe { Box::from_raw(handle) };
    boxed.session.destroy();
}

/// Register the consumer callback, replacing any previous registration.
/// A null `callback` unregisters.
#[no_mangle]
pub extern "C" fn audio_capture_set_callback(
    handle: *mut CaptureHandle,
    callback: CAudioCallback,
    user_data: *mut c_void,
) {
    let Some(session) = session(handle) else {
        return;
    };
    let Some(callback) = callback else {
        session.clear_callback();
        return;
    };

    let user_data = UserData(user_data);
    session.set_callback(Arc::new(move |buffer: &AudioBuffer| {
        let samples = buffer.samples();
        // SAFETY: the pointer and length describe dispatcher-owned memory
        // that outlives this call; the callee contract forbids retaining it.
        unsafe { callback(samples.as_ptr(), buffer.frames() as c_int, user_data.as_ptr()) };
    }));
}

/// Copy the negotiated format into `out`. Fails (0) before initialize.
#[no_mangle]
pub extern "C" fn audio_capture_get_format(
    handle: *mut CaptureHandle,
    out: *mut CAudioFormat,
) -> c_int {
    let Some(session) = session(handle) else {
        return 0;
    };
    if out.is_null() {
        return 0;
    }
    match session.format() {
        Ok(format) => {
            // SAFETY: `out` is a valid caller-provided struct pointer.
            unsafe {
                *out = CAudioFormat {
                    sample_rate: format.sample_rate,
                    channels: u32::from(format.channels),
                    bits_per_sample: u32::from(format.bits_per_sample),
                };
            }
            1
        }
        Err(error) => {
            log::error!("audio_capture_get_format failed: {error}");
            0
        }
    }
}

/// Fill `out` (capacity `max_count`) with the processes currently rendering
/// audio. Returns the number of entries written; truncates silently, and 0
/// can mean "none" as well as "failed".
#[no_mangle]
pub extern "C" fn audio_capture_get_applications(
    handle: *mut CaptureHandle,
    out: *mut CAudioAppInfo,
    max_count: c_int,
) -> c_int {
    let Some(session) = session(handle) else {
        return 0;
    };
    if out.is_null() || max_count <= 0 {
        return 0;
    }

    let applications = match session.list_applications(max_count as usize) {
        Ok(applications) => applications,
        Err(error) => {
            log::error!("audio_capture_get_applications failed: {error}");
            return 0;
        }
    };

    // SAFETY: caller guarantees `out` points to `max_count` entries.
    let slots = unsafe { std::slice::from_raw_parts_mut(out, max_count as usize) };
    for (slot, app) in slots.iter_mut().zip(&applications) {
        slot.pid = app.pid;
        write_name(&mut slot.name, &app.name);
    }
    applications.len() as c_int
}

/// Buffers rejected by the session's bounded dispatch queue so far.
#[no_mangle]
pub extern "C" fn audio_capture_dropped_buffers(handle: *mut CaptureHandle) -> u64 {
    session(handle).map_or(0, |s| s.dropped_buffers())
}

/// NUL-terminated UTF-8 copy into a fixed slot, truncated on a character
/// boundary to fit.
fn write_name(slot: &mut [c_char; APP_NAME_CAP], name: &str) {
    let mut len = 0;
    for ch in name.chars() {
        let mut utf8 = [0u8; 4];
        let encoded = ch.encode_utf8(&mut utf8).as_bytes();
        if len + encoded.len() >= APP_NAME_CAP {
            break;
        }
        for &byte in encoded {
            slot[len] = byte as c_char;
            len += 1;
        }
    }
    for byte in slot.iter_mut().skip(len) {
        *byte = 0;
    }
}
