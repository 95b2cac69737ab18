#![forbid(unsafe_code)]

//! # Webpilot API
//!
//! The structured, transport-agnostic command surface of the engine:
//! [`WorkflowService`] exposes every command (structural edits,
//! execution, store access, plan/description versions, browser debug
//! and inspection) as plain async methods over serde bodies, and
//! [`http::router`] adapts it onto HTTP+JSON with a server-sent-events
//! stream for `browser_state` / `plan_updated` / `node_executed`.
//!
//! Production deployments embed this crate as a library and inject a
//! real browser driver and text generator; the `dev-server` feature
//! builds the `webpilot-server` binary against the scripted backend.

pub mod config;
pub mod error;
pub mod http;
pub mod render;
pub mod service;

pub use config::{ApiConfig, ConfigError};
pub use error::ApiError;
pub use service::{DriverFactory, WorkflowService};
