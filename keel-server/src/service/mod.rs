//! Service Module
//!
//! Business logic layer for the server.
//! The actuator sits between the registry and the effect collaborators;
//! the event bus carries its status changes to every session.

pub mod actuator;
pub mod effects;
pub mod events;

// Re-export for convenience
pub use actuator::Actuator;
pub use effects::{EffectError, Effects, LoggingEffects};
pub use events::EventBus;
