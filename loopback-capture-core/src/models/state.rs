use serde::{Deserialize, Serialize};

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// uninitialized --initialize--> initialized
/// initialized --start/start_process--> capturing
/// capturing --stop--> stopped
/// stopped --start/start_process--> capturing
/// {any} --destroy--> destroyed (terminal)
/// ```
///
/// `stop` and `destroy` are idempotent; every other transition attempted from
/// the wrong state fails without changing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Capturing,
    Stopped,
    Destroyed,
}

impl SessionState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self, Self::Destroyed)
    }

    /// Whether `start`/`start_process` is a legal transition from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Initialized | Self::Stopped)
    }

    /// States in which the negotiated format snapshot exists.
    pub fn has_format(&self) -> bool {
        matches!(self, Self::Initialized | Self::Capturing | Self::Stopped)
    }
}

/// What a capture run is aimed at: the whole output mix, or one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetMode {
    SystemWide,
    Process(u32),
}
