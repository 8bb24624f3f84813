//! Keel control plane server
//!
//! Clients drive pipelines over a WebSocket control channel; every command
//! is applied to the in-memory [`repository::Registry`] by the
//! [`service::Actuator`] and acknowledged in order. A read-only HTTP
//! snapshot of the registry is served alongside.

pub mod api;
pub mod config;
pub mod repository;
pub mod seed;
pub mod server;
pub mod service;
pub mod session;

pub use config::Config;
pub use server::{Listeners, Server};
