//! Engine Error Types

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors from the session controller's control surface.
///
/// None of these are fatal to the host: the worst case is "compensation does
/// not start", recoverable by releasing and re-pressing the trigger.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Start requested while a session is already running
    #[error("compensation already active")]
    AlreadyActive,

    /// Start requested without an assigned weapon
    #[error("no weapon assigned")]
    NoWeaponAssigned,

    /// Weapon name not present in the profile store
    #[error("unknown weapon: {0}")]
    UnknownWeapon(String),

    /// Manual start while automatic weapon detection owns the session
    #[error("manual activation blocked: automatic weapon detection active")]
    ManualActivationBlocked,

    /// The OS refused to spawn the session thread
    #[error("failed to spawn session thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}
