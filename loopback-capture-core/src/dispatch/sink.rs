use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};

use crate::models::audio_models::AudioBuffer;
use crate::models::error::CaptureError;

/// Event pushed from a backend's delivery thread to the dispatch thread.
pub(crate) enum DeliveryEvent {
    Buffer(AudioBuffer),
    Fault(CaptureError),
}

/// Producer handle a backend pushes captured buffers into.
///
/// Cloneable so the backend can hand it to its delivery thread. Buffer
/// delivery never blocks: when the bounded queue is full the incoming buffer
/// is rejected, logged, and counted (reject-newest policy). Buffers that were
/// accepted are never dropped or reordered afterwards.
#[derive(Clone)]
pub struct DeliverySink {
    tx: Sender<DeliveryEvent>,
    dropped: Arc<AtomicU64>,
}

impl DeliverySink {
    pub(crate) fn new(tx: Sender<DeliveryEvent>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Queue one captured buffer for delivery.
    ///
    /// Returns `false` if the buffer was dropped (queue full or session
    /// shutting down). Safe to call from a real-time thread.
    pub fn deliver(&self, buffer: AudioBuffer) -> bool {
        match self.tx.try_send(DeliveryEvent::Buffer(buffer)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                log::warn!("dispatch queue full, dropping captured buffer");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Report a fault detected inside the capture path (device disconnected,
    /// process-scoped target gone).
    ///
    /// Faults must not be lost to queue overload, so this may block briefly
    /// behind queued buffers. The sink is unusable for delivery afterwards in
    /// practice; backends emit a fault as their final event.
    pub fn fault(&self, error: CaptureError) {
        log::error!("capture fault: {error}");
        let _ = self.tx.send(DeliveryEvent::Fault(error));
    }
}
