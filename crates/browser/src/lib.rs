#![forbid(unsafe_code)]

//! # Webpilot Browser
//!
//! The shared, long-lived multi-tab browser session. A [`BrowserSession`]
//! owns the tab registry (a main tab plus named auxiliary tabs) and the
//! active-tab pointer, delegates the actual page work to an injected
//! [`BrowserDriver`], persists a [`BrowserState`] snapshot after every
//! mutation, and emits it on the event bus.
//!
//! The driver port is where a real automation backend (CDP, Playwright
//! server, Stagehand sidecar) plugs in; the `test-util` feature ships a
//! [`ScriptedDriver`] replaying a scripted page world for hermetic
//! tests.

pub mod driver;
pub mod error;
pub mod session;
pub mod state;

#[cfg(any(test, feature = "test-util"))]
pub mod scripted;

pub use driver::{BrowserDriver, ClickTarget};
pub use error::BrowserError;
pub use session::{BrowserSession, MAIN_TAB, Screenshot};
pub use state::{BrowserState, TabInfo};

#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ClickEffect, PageSpec, ScriptedDriver};
