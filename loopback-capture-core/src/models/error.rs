use thiserror::Error;

/// Errors that can occur during capture session operations.
///
/// Every lifecycle operation reports failure through `Result<_, CaptureError>`;
/// nothing in the delivery path unwinds across a session boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("device error: {0}")]
    Device(String),

    #[error("session already initialized")]
    AlreadyInitialized,

    #[error("session not initialized")]
    NotInitialized,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("device busy: {0}")]
    DeviceBusy(String),

    #[error("process {0} is not rendering audio")]
    ProcessNotFound(u32),

    #[error("capture target (pid {0}) was lost")]
    TargetLost(u32),
}
