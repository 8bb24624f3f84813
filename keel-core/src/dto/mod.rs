//! Data Transfer Objects for the control channel
//!
//! This module contains the messages exchanged between clients and the
//! keel server over a control connection. Commands flow in, acknowledgements,
//! rejections and events flow out.

pub mod command;
pub mod message;

pub use command::{Action, Command};
pub use message::{Outcome, PipelineEvent, ServerMessage};
