//! The browser driver port.
//!
//! Everything that actually touches a page goes through this trait; the
//! session layers tab management, auto-validation, and state emission on
//! top. A deployment implements it against its automation backend; the
//! `test-util` [`ScriptedDriver`](crate::scripted::ScriptedDriver)
//! implements it against a scripted page world.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::BrowserError;

/// What a click targets.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickTarget {
    /// A CSS selector.
    Selector(String),
    /// Viewport coordinates.
    Coords {
        /// X offset in CSS pixels.
        x: f64,
        /// Y offset in CSS pixels.
        y: f64,
    },
}

/// Port trait for the concrete automation backend.
///
/// Tabs are addressed by the session-assigned name; the driver keeps one
/// page per name. All operations may suspend.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Create a page for a tab, optionally navigating it.
    async fn open_page(&self, tab: &str, url: Option<&str>) -> Result<(), BrowserError>;

    /// Destroy a tab's page.
    async fn close_page(&self, tab: &str) -> Result<(), BrowserError>;

    /// Navigate a tab.
    async fn navigate(&self, tab: &str, url: &str) -> Result<(), BrowserError>;

    /// The tab's current URL.
    async fn current_url(&self, tab: &str) -> Result<String, BrowserError>;

    /// The tab's current title.
    async fn title(&self, tab: &str) -> Result<String, BrowserError>;

    /// Click a selector or coordinates.
    async fn click(&self, tab: &str, target: &ClickTarget) -> Result<(), BrowserError>;

    /// Type text into the element matching the selector.
    async fn type_text(&self, tab: &str, selector: &str, text: &str) -> Result<(), BrowserError>;

    /// Press a key.
    async fn keypress(&self, tab: &str, key: &str) -> Result<(), BrowserError>;

    /// Wait until the selector matches, up to the deadline.
    async fn wait_for_selector(
        &self,
        tab: &str,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), BrowserError>;

    /// History back.
    async fn back(&self, tab: &str) -> Result<(), BrowserError>;

    /// History forward.
    async fn forward(&self, tab: &str) -> Result<(), BrowserError>;

    /// Reload the page.
    async fn reload(&self, tab: &str) -> Result<(), BrowserError>;

    /// Capture a PNG screenshot.
    async fn screenshot(&self, tab: &str, full_page: bool) -> Result<Vec<u8>, BrowserError>;

    /// Whether the selector currently matches anything.
    async fn selector_exists(&self, tab: &str, selector: &str) -> Result<bool, BrowserError>;

    /// Number of elements matching the selector.
    async fn count(&self, tab: &str, selector: &str) -> Result<u64, BrowserError>;

    /// Deterministic extraction: for every element matching `selector`,
    /// map each field name through its sub-selector/attribute spec.
    /// Returns an array of objects.
    async fn extract_fields(
        &self,
        tab: &str,
        selector: &str,
        fields: &IndexMap<String, String>,
    ) -> Result<Value, BrowserError>;

    /// AI extraction over the page, guided by a schema declaration.
    async fn ai_extract(
        &self,
        tab: &str,
        instruction: &str,
        schema: &Value,
    ) -> Result<Value, BrowserError>;

    /// AI-performed page action. No structured result.
    async fn ai_act(&self, tab: &str, instruction: &str) -> Result<(), BrowserError>;

    /// AI yes/no judgment over the page.
    async fn ai_assess(&self, tab: &str, instruction: &str) -> Result<bool, BrowserError>;

    /// Compact accessibility-tree snapshot with stable element ids.
    async fn accessibility_snapshot(&self, tab: &str) -> Result<Value, BrowserError>;

    /// Full attribute set and ranked candidate selectors for an element
    /// id from a prior snapshot.
    async fn element_detail(&self, tab: &str, element_id: &str) -> Result<Value, BrowserError>;
}
