use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::dispatch::sink::{DeliveryEvent, DeliverySink};
use crate::models::audio_models::{AudioBuffer, SessionDiagnostics};
use crate::models::error::CaptureError;

/// Consumer callback receiving captured buffers.
///
/// Invoked on the dispatch thread, one buffer at a time, in capture order.
/// The buffer reference is valid only for the duration of the call; copy
/// anything that must outlive it. The callback must return quickly: it
/// backpressures the dispatch queue, and a full queue drops buffers.
pub type BufferCallback = Arc<dyn Fn(&AudioBuffer) + Send + Sync + 'static>;

/// Hook invoked on the dispatch thread when a backend reports a fault.
pub type FaultHook = Arc<dyn Fn(CaptureError) + Send + Sync + 'static>;

/// Bridges a backend's real-time delivery cadence to one consumer callback.
///
/// The backend pushes into a bounded queue through a [`DeliverySink`]; a
/// dedicated dispatch thread drains it and invokes the registered callback.
/// This decouples consumer processing time from the real-time thread, at the
/// cost of an explicit overflow policy (reject-newest, counted).
///
/// Delivery guarantees:
/// - accepted buffers reach the callback exactly once, in order
/// - the callback is never invoked concurrently with its own replacement
///   or with shutdown completing
/// - a panicking callback is contained, logged, counted, and delivery
///   continues with the next buffer
pub struct CaptureDispatcher {
    slot: Arc<Mutex<Option<BufferCallback>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    delivered: Arc<AtomicU64>,
    frames: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    panics: Arc<AtomicU64>,
}

impl CaptureDispatcher {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            worker: Mutex::new(None),
            delivered: Arc::new(AtomicU64::new(0)),
            frames: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            panics: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register the consumer callback, replacing any previous registration.
    ///
    /// Blocks until an in-flight invocation of the previous callback (if any)
    /// returns; the dispatch thread never observes a torn registration.
    /// Takes effect for buffers dispatched after it returns.
    pub fn set_callback(&self, callback: BufferCallback) {
        *self.slot.lock() = Some(callback);
    }

    /// Unregister the consumer callback. Subsequent buffers are discarded.
    pub fn clear_callback(&self) {
        *self.slot.lock() = None;
    }

    /// Begin a dispatch run: spawn the dispatch thread and hand back the
    /// producer sink for the backend.
    ///
    /// Any previous run's worker is reaped first; the caller must guarantee
    /// that run's producers are already gone. Fails with
    /// `CaptureError::Allocation` when the thread cannot be spawned.
    pub fn start(
        &self,
        queue_depth: usize,
        on_fault: FaultHook,
    ) -> Result<DeliverySink, CaptureError> {
        self.shutdown();

        let (tx, rx) = crossbeam_channel::bounded::<DeliveryEvent>(queue_depth);
        let slot = Arc::clone(&self.slot);
        let delivered = Arc::clone(&self.delivered);
        let frames = Arc::clone(&self.frames);
        let panics = Arc::clone(&self.panics);

        let handle = thread::Builder::new()
            .name("capture-dispatch".into())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    match event {
                        DeliveryEvent::Buffer(buffer) => {
                            // The slot stays locked for the whole invocation:
                            // set_callback and shutdown wait for in-flight
                            // calls instead of overlapping them.
                            let guard = slot.lock();
                            let Some(callback) = guard.as_ref() else {
                                continue;
                            };
                            match panic::catch_unwind(AssertUnwindSafe(|| callback(&buffer))) {
                                Ok(()) => {
                                    delivered.fetch_add(1, Ordering::Relaxed);
                                    frames.fetch_add(buffer.frames() as u64, Ordering::Relaxed);
                                }
                                Err(_) => {
                                    panics.fetch_add(1, Ordering::Relaxed);
                                    log::error!("consumer callback panicked; continuing delivery");
                                }
                            }
                        }
                        DeliveryEvent::Fault(error) => on_fault(error),
                    }
                }
            })
            .map_err(|e| CaptureError::Allocation(format!("failed to spawn dispatch thread: {e}")))?;

        *self.worker.lock() = Some(handle);
        Ok(DeliverySink::new(tx, Arc::clone(&self.dropped)))
    }

    /// Drain remaining accepted events and join the dispatch thread.
    ///
    /// Returns once no callback invocation is or will be in flight for this
    /// run. The thread exits when the queue is empty and every sink clone is
    /// dropped, so producers must be stopped first. Idempotent.
    pub fn shutdown(&self) {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }
    }

    /// Lifetime counters across all dispatch runs of this dispatcher.
    pub fn diagnostics(&self) -> SessionDiagnostics {
        SessionDiagnostics {
            buffers_delivered: self.delivered.load(Ordering::Relaxed),
            frames_delivered: self.frames.load(Ordering::Relaxed),
            buffers_dropped: self.dropped.load(Ordering::Relaxed),
            callback_panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

impl Default for CaptureDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
