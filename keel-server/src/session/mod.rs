//! Session Module
//!
//! One task per control connection, and the supervisor that spawns and
//! shuts them down.

pub mod channel;
pub mod connection;
pub mod supervisor;

pub use channel::{ControlChannel, Frame, TransportError};
pub use connection::{CloseReason, Session, SessionConfig, SessionState};
pub use supervisor::SessionSupervisor;
