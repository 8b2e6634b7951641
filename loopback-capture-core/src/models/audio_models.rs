use serde::{Deserialize, Serialize};

/// Display names longer than this are truncated on construction.
/// Matches the fixed `name[260]` buffer of the C ABI (MAX_PATH-derived).
pub const MAX_APP_NAME_LEN: usize = 260;

/// PCM layout negotiated at session initialize time.
///
/// Immutable once produced; every buffer delivered by that session uses
/// this layout for the session's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Container bit depth. Valid values: 16, 24, 32.
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels == 0 {
            return Err("channel count must be positive".into());
        }
        if ![16, 24, 32].contains(&self.bits_per_sample) {
            return Err(format!("unsupported bit depth: {}", self.bits_per_sample));
        }
        Ok(())
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
        }
    }
}

/// A process currently rendering audio, as seen by one enumeration snapshot.
///
/// No identity persists across snapshots beyond pid reuse by the OS.
/// Names are not necessarily unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub pid: u32,
    pub name: String,
}

impl ApplicationInfo {
    /// Build an entry, truncating `name` to [`MAX_APP_NAME_LEN`] characters.
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        let name: String = name.into();
        let name = if name.chars().count() > MAX_APP_NAME_LEN {
            name.chars().take(MAX_APP_NAME_LEN).collect()
        } else {
            name
        };
        Self { pid, name }
    }
}

/// One block of captured PCM handed to the consumer callback.
///
/// Samples are interleaved 32-bit floats in [-1.0, 1.0]. The buffer is owned
/// by the dispatcher for the duration of the callback invocation only;
/// consumers must copy anything they want to keep.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, channels: u16) -> Self {
        // Zero channels would make frames() divide by zero; treat as mono.
        let channels = channels.max(1);
        Self { samples, channels }
    }

    /// Interleaved samples, `frames() * channels()` long.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (one sample per channel per frame).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }
}

/// Counters for observing a session's delivery path.
///
/// `buffers_dropped` counts queue-overflow rejections; `callback_panics`
/// counts consumer callbacks that panicked and were contained at the
/// dispatch boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub buffers_delivered: u64,
    pub frames_delivered: u64,
    pub buffers_dropped: u64,
    pub callback_panics: u64,
}
