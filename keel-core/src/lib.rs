//! Keel Core
//!
//! Core types and abstractions for the keel pipeline control plane.
//!
//! This crate contains:
//! - Domain types: pipelines and their ordered stages
//! - DTOs: commands, outcomes and events carried on the control channel
//! - Codec: decoding of inbound commands, encoding of server messages

pub mod codec;
pub mod domain;
pub mod dto;
