use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::dispatch::sink::DeliverySink;
use crate::models::audio_models::{ApplicationInfo, AudioBuffer, AudioFormat};
use crate::models::error::CaptureError;
use crate::traits::capture_backend::CaptureBackend;

/// No-op capture backend.
///
/// Stands in when no platform interception backend is compiled in, and
/// doubles as the scripted backend for tests: it can report a canned format
/// and application list, replay a fixed sequence of buffers synchronously on
/// start, stream silence from a delivery thread, and inject failures or
/// mid-capture faults.
///
/// By default it negotiates 44.1 kHz / 2 ch / 16-bit and captures nothing.
pub struct NullBackend {
    format: AudioFormat,
    applications: Vec<ApplicationInfo>,
    script: Vec<Vec<f32>>,
    stream_frames: Option<usize>,
    fault: Option<FaultPlan>,
    open_error: Option<CaptureError>,
    start_error: Option<CaptureError>,
    available: bool,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

#[derive(Clone)]
struct FaultPlan {
    after_buffers: usize,
    error: CaptureError,
}

impl NullBackend {
    pub fn new() -> Self {
        Self {
            format: AudioFormat::default(),
            applications: Vec::new(),
            script: Vec::new(),
            stream_frames: None,
            fault: None,
            open_error: None,
            start_error: None,
            available: true,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// Negotiate `format` at initialize instead of the default layout.
    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = format;
        self
    }

    /// Report these processes from `list_applications` and accept their pids
    /// for `start_process`.
    pub fn with_applications(mut self, applications: Vec<ApplicationInfo>) -> Self {
        self.applications = applications;
        self
    }

    /// Push each buffer (interleaved samples) synchronously during start,
    /// in order.
    pub fn with_script(mut self, buffers: Vec<Vec<f32>>) -> Self {
        self.script = buffers;
        self
    }

    /// After the script, keep streaming silent buffers of `frames` frames
    /// from a delivery thread until stopped.
    pub fn streaming(mut self, frames: usize) -> Self {
        self.stream_frames = Some(frames);
        self
    }

    /// Emit `error` through the sink's fault lane once `after_buffers`
    /// streamed buffers have been delivered, then stop producing.
    pub fn faulting_after(mut self, after_buffers: usize, error: CaptureError) -> Self {
        self.fault = Some(FaultPlan {
            after_buffers,
            error,
        });
        self
    }

    /// Fail `open_endpoint` with `error`.
    pub fn failing_open(mut self, error: CaptureError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Fail `start`/`start_process` with `error`.
    pub fn failing_start(mut self, error: CaptureError) -> Self {
        self.start_error = Some(error);
        self
    }

    /// Report the device subsystem as unreachable.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn begin(&mut self, sink: DeliverySink) -> Result<(), CaptureError> {
        if let Some(error) = self.start_error.clone() {
            return Err(error);
        }
        // Reap a previous run's thread before starting another.
        self.stop();

        let channels = self.format.channels;
        let mut sent = 0usize;
        for samples in &self.script {
            sink.deliver(AudioBuffer::new(samples.clone(), channels));
            sent += 1;
        }

        if let Some(frames) = self.stream_frames {
            self.running.store(true, Ordering::SeqCst);
            let running = Arc::clone(&self.running);
            let fault = self.fault.clone();

            let handle = thread::Builder::new()
                .name("null-capture".into())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        if let Some(ref plan) = fault {
                            if sent >= plan.after_buffers {
                                sink.fault(plan.error.clone());
                                return;
                            }
                        }
                        sink.deliver(AudioBuffer::new(
                            vec![0.0; frames * channels as usize],
                            channels,
                        ));
                        sent += 1;
                        thread::sleep(Duration::from_millis(1));
                    }
                })
                .map_err(|e| CaptureError::Allocation(format!("failed to spawn capture thread: {e}")))?;
            self.worker = Some(handle);
        } else if let Some(plan) = self.fault.clone() {
            // Scripted runs emit their planned fault as the final event.
            sink.fault(plan.error);
        }

        Ok(())
    }
}

impl CaptureBackend for NullBackend {
    fn is_available(&self) -> bool {
        self.available
    }

    fn open_endpoint(&mut self) -> Result<AudioFormat, CaptureError> {
        if let Some(error) = self.open_error.clone() {
            return Err(error);
        }
        Ok(self.format)
    }

    fn start(&mut self, sink: DeliverySink) -> Result<(), CaptureError> {
        self.begin(sink)
    }

    fn start_process(&mut self, pid: u32, sink: DeliverySink) -> Result<(), CaptureError> {
        if !self.applications.iter().any(|app| app.pid == pid) {
            return Err(CaptureError::ProcessNotFound(pid));
        }
        self.begin(sink)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn list_applications(&mut self, max_count: usize) -> Result<Vec<ApplicationInfo>, CaptureError> {
        Ok(self
            .applications
            .iter()
            .take(max_count)
            .cloned()
            .collect())
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NullBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
