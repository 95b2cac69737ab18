#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Webpilot Telemetry
//!
//! Observability primitives: a broadcast [`EventBus`] carrying
//! [`WorkflowEvent`]s (browser state, plan versions, per-node reports,
//! execution lifecycle) and an in-memory [`MetricsRegistry`].
//!
//! Events are fire-and-forget projections, **not** the source of truth;
//! delivery to subscribers is best-effort and lag-tolerant.

pub mod event;
pub mod metrics;

pub use event::{EventBus, EventSubscriber, WorkflowEvent};
pub use metrics::{Counter, Histogram, MetricsRegistry};
