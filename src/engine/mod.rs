//! Compensation Engine
//!
//! The session controller owns the dedicated compensation thread and the
//! shared flags that coordinate with it. The session loop polls the trigger,
//! plays the active weapon's calculated pattern through the cursor sink, and
//! honors cooperative cancellation at every tick. Status and position events
//! fan out to subscribers through typed channels.

pub mod controller;
pub mod error;
pub mod events;
mod session;

pub use controller::{ControllerOptions, RecoilController, StartMode};
pub use error::EngineError;
pub use events::{EventBus, PositionEvent, StatusEvent};
