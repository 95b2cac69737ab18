//! The shared multi-tab browser session.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;
use webpilot_core::WorkflowId;
use webpilot_store::StoreBackend;
use webpilot_telemetry::{EventBus, WorkflowEvent};

use crate::driver::{BrowserDriver, ClickTarget};
use crate::error::BrowserError;
use crate::state::{BrowserState, TabInfo};

/// Name of the always-present main tab.
pub const MAIN_TAB: &str = "main";

/// Default deadline for a single browser operation.
const OP_DEADLINE: Duration = Duration::from_secs(30);

/// Upper bound on any wait, regardless of what the caller asked for.
const MAX_WAIT: Duration = Duration::from_secs(30);

/// A captured screenshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Screenshot {
    /// The tab that was captured.
    pub tab: String,
    /// PNG bytes, base64-encoded.
    pub base64_png: String,
}

#[derive(Debug, Clone)]
struct TabEntry {
    url: String,
    title: String,
    history: Vec<String>,
}

#[derive(Debug)]
struct TabRegistry {
    tabs: IndexMap<String, TabEntry>,
    active: String,
    opened: u32,
}

/// The shared browser session: tab registry, active-tab pointer, and
/// state persistence/emission over an injected driver.
///
/// Owned by exactly one in-flight execution at a time; all tabs are
/// serialized through it.
pub struct BrowserSession {
    driver: Arc<dyn BrowserDriver>,
    store: Arc<dyn StoreBackend>,
    events: Arc<EventBus>,
    workflow_id: WorkflowId,
    registry: RwLock<TabRegistry>,
}

impl BrowserSession {
    /// Create a session with an open, blank main tab.
    pub async fn open(
        driver: Arc<dyn BrowserDriver>,
        store: Arc<dyn StoreBackend>,
        events: Arc<EventBus>,
        workflow_id: WorkflowId,
    ) -> Result<Self, BrowserError> {
        driver.open_page(MAIN_TAB, None).await?;
        let session = Self {
            driver,
            store,
            events,
            workflow_id,
            registry: RwLock::new(TabRegistry {
                tabs: IndexMap::from([(
                    MAIN_TAB.to_owned(),
                    TabEntry {
                        url: String::new(),
                        title: String::new(),
                        history: Vec::new(),
                    },
                )]),
                active: MAIN_TAB.to_owned(),
                opened: 0,
            }),
        };
        session.publish_state().await?;
        Ok(session)
    }

    /// Resolve the target tab: explicit name, or the active tab.
    fn target(&self, tab: Option<&str>) -> Result<String, BrowserError> {
        let registry = self.registry.read();
        match tab {
            Some(name) => {
                if registry.tabs.contains_key(name) {
                    Ok(name.to_owned())
                } else {
                    Err(BrowserError::TabNotFound {
                        name: name.to_owned(),
                    })
                }
            }
            None => Ok(registry.active.clone()),
        }
    }

    /// The current snapshot.
    #[must_use]
    pub fn state(&self) -> BrowserState {
        let registry = self.registry.read();
        BrowserState {
            tabs: registry
                .tabs
                .iter()
                .map(|(name, entry)| TabInfo {
                    name: name.clone(),
                    url: entry.url.clone(),
                    title: entry.title.clone(),
                    is_active: *name == registry.active,
                })
                .collect(),
            active_tab_name: registry.active.clone(),
        }
    }

    /// All tabs.
    #[must_use]
    pub fn list_tabs(&self) -> Vec<TabInfo> {
        self.state().tabs
    }

    /// The active tab.
    #[must_use]
    pub fn current_tab(&self) -> TabInfo {
        let state = self.state();
        state
            .tabs
            .into_iter()
            .find(|tab| tab.is_active)
            .expect("registry always has an active tab")
    }

    /// Navigate a tab, optionally validating the landing host.
    pub async fn navigate(
        &self,
        url: &str,
        tab: Option<&str>,
        validate_landing: bool,
    ) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        debug!(tab = %tab, url, "navigate");
        with_deadline("navigate", self.driver.navigate(&tab, url)).await?;

        if validate_landing {
            let landed = self.driver.current_url(&tab).await?;
            if !same_host(url, &landed) {
                return Err(BrowserError::NavigationFailed {
                    reason: format!("requested {url}, landed on {landed}"),
                });
            }
        }

        {
            let mut registry = self.registry.write();
            if let Some(entry) = registry.tabs.get_mut(&tab) {
                entry.history.push(url.to_owned());
            }
        }
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// Click a selector or coordinates.
    ///
    /// With `expect_progress`, the session confirms afterwards that the
    /// clicked selector vanished or the URL changed.
    pub async fn click(
        &self,
        target: &ClickTarget,
        tab: Option<&str>,
        expect_progress: bool,
    ) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        let before = self.driver.current_url(&tab).await?;
        with_deadline("click", self.driver.click(&tab, target)).await?;

        if expect_progress {
            self.confirm_progress(&tab, &before, click_selector(target))
                .await?;
        }
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// Type text into a selector.
    pub async fn type_text(
        &self,
        selector: &str,
        text: &str,
        tab: Option<&str>,
        expect_progress: bool,
    ) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        let before = self.driver.current_url(&tab).await?;
        with_deadline("type", self.driver.type_text(&tab, selector, text)).await?;

        if expect_progress {
            self.confirm_progress(&tab, &before, Some(selector)).await?;
        }
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// Press a key.
    pub async fn keypress(&self, key: &str, tab: Option<&str>) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        with_deadline("keypress", self.driver.keypress(&tab, key)).await?;
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// Wait for a selector and/or a fixed delay. Waits are capped at 30 s.
    pub async fn wait(
        &self,
        selector: Option<&str>,
        ms: Option<u64>,
        tab: Option<&str>,
    ) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        match (selector, ms) {
            (Some(selector), budget) => {
                let deadline = Duration::from_millis(budget.unwrap_or(MAX_WAIT.as_millis() as u64))
                    .min(MAX_WAIT);
                self.driver
                    .wait_for_selector(&tab, selector, deadline)
                    .await
            }
            (None, Some(ms)) => {
                tokio::time::sleep(Duration::from_millis(ms).min(MAX_WAIT)).await;
                Ok(())
            }
            (None, None) => Err(BrowserError::InvalidOperation {
                reason: "wait needs a selector or a duration".into(),
            }),
        }
    }

    /// Open a named auxiliary tab and make it active.
    ///
    /// Returns the tab name (generated when not given).
    pub async fn open_tab(
        &self,
        url: Option<&str>,
        name: Option<String>,
    ) -> Result<String, BrowserError> {
        let (name, previous_active) = {
            let mut registry = self.registry.write();
            let name = match name {
                Some(name) => name,
                None => {
                    registry.opened += 1;
                    format!("tab_{}", registry.opened)
                }
            };
            if registry.tabs.contains_key(&name) {
                return Err(BrowserError::InvalidOperation {
                    reason: format!("tab {name:?} already exists"),
                });
            }
            registry.tabs.insert(
                name.clone(),
                TabEntry {
                    url: String::new(),
                    title: String::new(),
                    history: url.iter().map(ToString::to_string).collect(),
                },
            );
            let previous_active = std::mem::replace(&mut registry.active, name.clone());
            (name, previous_active)
        };

        if let Err(err) = self.driver.open_page(&name, url).await {
            // Roll the registry back so a failed open leaves no ghost tab.
            let mut registry = self.registry.write();
            registry.tabs.shift_remove(&name);
            registry.active = previous_active;
            return Err(err);
        }
        self.sync_tab(&name).await?;
        self.publish_state().await?;
        Ok(name)
    }

    /// Close a named tab. The main tab cannot be closed.
    pub async fn close_tab(&self, name: &str) -> Result<(), BrowserError> {
        if name == MAIN_TAB {
            return Err(BrowserError::InvalidOperation {
                reason: "the main tab cannot be closed".into(),
            });
        }
        {
            let registry = self.registry.read();
            if !registry.tabs.contains_key(name) {
                return Err(BrowserError::TabNotFound {
                    name: name.to_owned(),
                });
            }
        }
        self.driver.close_page(name).await?;
        {
            let mut registry = self.registry.write();
            registry.tabs.shift_remove(name);
            if registry.active == name {
                registry.active = MAIN_TAB.to_owned();
            }
        }
        self.publish_state().await
    }

    /// Make a tab active.
    pub async fn switch_tab(&self, name: &str) -> Result<(), BrowserError> {
        {
            let mut registry = self.registry.write();
            if !registry.tabs.contains_key(name) {
                return Err(BrowserError::TabNotFound {
                    name: name.to_owned(),
                });
            }
            registry.active = name.to_owned();
        }
        self.publish_state().await
    }

    /// History back.
    pub async fn back(&self, tab: Option<&str>) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        with_deadline("back", self.driver.back(&tab)).await?;
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// History forward.
    pub async fn forward(&self, tab: Option<&str>) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        with_deadline("forward", self.driver.forward(&tab)).await?;
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// Reload the page.
    pub async fn reload(&self, tab: Option<&str>) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        with_deadline("reload", self.driver.reload(&tab)).await?;
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// Capture a screenshot.
    pub async fn screenshot(
        &self,
        tab: Option<&str>,
        full_page: bool,
    ) -> Result<Screenshot, BrowserError> {
        let tab = self.target(tab)?;
        let bytes = with_deadline("screenshot", self.driver.screenshot(&tab, full_page)).await?;
        Ok(Screenshot {
            tab,
            base64_png: BASE64.encode(bytes),
        })
    }

    /// Whether a selector currently matches.
    pub async fn selector_exists(
        &self,
        selector: &str,
        tab: Option<&str>,
    ) -> Result<bool, BrowserError> {
        let tab = self.target(tab)?;
        self.driver.selector_exists(&tab, selector).await
    }

    /// Number of elements matching a selector.
    pub async fn count(&self, selector: &str, tab: Option<&str>) -> Result<u64, BrowserError> {
        let tab = self.target(tab)?;
        self.driver.count(&tab, selector).await
    }

    /// Deterministic field extraction.
    pub async fn extract(
        &self,
        selector: &str,
        fields: &IndexMap<String, String>,
        tab: Option<&str>,
    ) -> Result<Value, BrowserError> {
        let tab = self.target(tab)?;
        self.driver.extract_fields(&tab, selector, fields).await
    }

    /// AI extraction against a schema declaration.
    pub async fn ai_extract(
        &self,
        instruction: &str,
        schema: &Value,
        tab: Option<&str>,
    ) -> Result<Value, BrowserError> {
        let tab = self.target(tab)?;
        self.driver.ai_extract(&tab, instruction, schema).await
    }

    /// AI-performed page action; publishes state afterwards since the
    /// page may have changed.
    pub async fn ai_act(&self, instruction: &str, tab: Option<&str>) -> Result<(), BrowserError> {
        let tab = self.target(tab)?;
        self.driver.ai_act(&tab, instruction).await?;
        self.sync_tab(&tab).await?;
        self.publish_state().await
    }

    /// AI yes/no judgment over the page.
    pub async fn ai_assess(
        &self,
        instruction: &str,
        tab: Option<&str>,
    ) -> Result<bool, BrowserError> {
        let tab = self.target(tab)?;
        self.driver.ai_assess(&tab, instruction).await
    }

    /// Compact accessibility-tree snapshot of a tab.
    pub async fn inspect_tab(&self, tab: Option<&str>) -> Result<Value, BrowserError> {
        let tab = self.target(tab)?;
        self.driver.accessibility_snapshot(&tab).await
    }

    /// Full attribute set and ranked candidate selectors for an element.
    pub async fn expand_element(
        &self,
        element_id: &str,
        tab: Option<&str>,
    ) -> Result<Value, BrowserError> {
        let tab = self.target(tab)?;
        self.driver.element_detail(&tab, element_id).await
    }

    /// Reset to a pristine session: close every auxiliary tab, clear
    /// per-tab history, navigate the main tab to `about:blank`.
    pub async fn reset(&self) -> Result<(), BrowserError> {
        let auxiliary: Vec<String> = {
            let registry = self.registry.read();
            registry
                .tabs
                .keys()
                .filter(|name| *name != MAIN_TAB)
                .cloned()
                .collect()
        };
        for name in auxiliary {
            self.driver.close_page(&name).await?;
            self.registry.write().tabs.shift_remove(&name);
        }

        self.driver.navigate(MAIN_TAB, "about:blank").await?;
        {
            let mut registry = self.registry.write();
            registry.active = MAIN_TAB.to_owned();
            if let Some(main) = registry.tabs.get_mut(MAIN_TAB) {
                main.history.clear();
            }
        }
        self.sync_tab(MAIN_TAB).await?;
        self.publish_state().await
    }

    /// After a progress-expecting operation: the selector must be gone
    /// or the URL must have changed.
    async fn confirm_progress(
        &self,
        tab: &str,
        url_before: &str,
        selector: Option<&str>,
    ) -> Result<(), BrowserError> {
        let url_now = self.driver.current_url(tab).await?;
        if url_now != url_before {
            return Ok(());
        }
        if let Some(selector) = selector {
            if !self.driver.selector_exists(tab, selector).await? {
                return Ok(());
            }
        }
        Err(BrowserError::NavigationFailed {
            reason: format!(
                "expected progress on {tab}: url unchanged ({url_before}) and selector still present"
            ),
        })
    }

    /// Refresh a tab's mirrored URL and title from the driver.
    async fn sync_tab(&self, tab: &str) -> Result<(), BrowserError> {
        let url = self.driver.current_url(tab).await?;
        let title = self.driver.title(tab).await?;
        let mut registry = self.registry.write();
        if let Some(entry) = registry.tabs.get_mut(tab) {
            entry.url = url;
            entry.title = title;
        }
        Ok(())
    }

    /// Persist the snapshot and emit it. Persistence failures are store
    /// errors (fatal to the running node); emission is fire-and-forget.
    async fn publish_state(&self) -> Result<(), BrowserError> {
        let state = self.state();
        let value = serde_json::to_value(&state).map_err(|err| BrowserError::Driver {
            reason: format!("state serialization: {err}"),
        })?;
        self.store
            .set_browser_state(self.workflow_id, value.clone())
            .await?;
        self.events.emit(WorkflowEvent::BrowserState {
            workflow_id: self.workflow_id.to_string(),
            state: value,
        });
        Ok(())
    }
}

fn click_selector(target: &ClickTarget) -> Option<&str> {
    match target {
        ClickTarget::Selector(selector) => Some(selector),
        ClickTarget::Coords { .. } => None,
    }
}

/// Two URLs share a host (or are both host-less, like `about:blank`).
fn same_host(requested: &str, landed: &str) -> bool {
    let host = |s: &str| Url::parse(s).ok().and_then(|u| u.host_str().map(String::from));
    host(requested) == host(landed)
}

async fn with_deadline<T>(
    op: &str,
    future: impl Future<Output = Result<T, BrowserError>>,
) -> Result<T, BrowserError> {
    match tokio::time::timeout(OP_DEADLINE, future).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::Timeout {
            op: op.to_owned(),
            deadline: OP_DEADLINE,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::{ClickEffect, PageSpec, ScriptedDriver};
    use base64::Engine as _;
    use pretty_assertions::assert_eq;
    use webpilot_store::MemoryStore;

    async fn session(driver: ScriptedDriver) -> (BrowserSession, Arc<EventBus>) {
        let events = Arc::new(EventBus::new(64));
        let session = BrowserSession::open(
            Arc::new(driver),
            Arc::new(MemoryStore::new()),
            Arc::clone(&events),
            WorkflowId::v4(),
        )
        .await
        .unwrap();
        (session, events)
    }

    fn inbox_driver() -> ScriptedDriver {
        ScriptedDriver::new().with_page(
            "https://mail.example.com/inbox",
            PageSpec::new("Inbox").with_selectors(["#compose", ".email-row"]),
        )
    }

    #[tokio::test]
    async fn open_starts_with_blank_main_tab() {
        let (session, events) = session(ScriptedDriver::new()).await;
        let state = session.state();
        assert_eq!(state.active_tab_name, MAIN_TAB);
        assert_eq!(state.tabs.len(), 1);
        // The initial snapshot was emitted.
        assert_eq!(events.total_emitted(), 1);
    }

    #[tokio::test]
    async fn navigate_updates_state_and_emits() {
        let (session, events) = session(inbox_driver()).await;
        session
            .navigate("https://mail.example.com/inbox", None, true)
            .await
            .unwrap();

        let tab = session.current_tab();
        assert_eq!(tab.url, "https://mail.example.com/inbox");
        assert_eq!(tab.title, "Inbox");
        assert_eq!(events.total_emitted(), 2);
    }

    #[tokio::test]
    async fn landing_validation_rejects_host_mismatch() {
        let driver = ScriptedDriver::new()
            .with_page(
                "https://mail.example.com/login",
                PageSpec::new("Login").with_redirect("https://sso.example.org/auth"),
            )
            .with_page("https://sso.example.org/auth", PageSpec::new("SSO"));
        let (session, _) = session(driver).await;

        let err = session
            .navigate("https://mail.example.com/login", None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::NavigationFailed { .. }));
    }

    #[tokio::test]
    async fn click_missing_selector_is_selector_failed() {
        let (session, _) = session(inbox_driver()).await;
        session
            .navigate("https://mail.example.com/inbox", None, true)
            .await
            .unwrap();

        let err = session
            .click(&ClickTarget::Selector("#nope".into()), None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::SelectorFailed { .. }));
    }

    #[tokio::test]
    async fn progress_expectation_passes_when_selector_vanishes() {
        let driver = inbox_driver().with_click_effect(
            "#compose",
            ClickEffect::default().removing_selector("#compose"),
        );
        let (session, _) = session(driver).await;
        session
            .navigate("https://mail.example.com/inbox", None, true)
            .await
            .unwrap();

        session
            .click(&ClickTarget::Selector("#compose".into()), None, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn progress_expectation_fails_when_nothing_changes() {
        let driver = inbox_driver().with_click_effect("#compose", ClickEffect::default());
        let (session, _) = session(driver).await;
        session
            .navigate("https://mail.example.com/inbox", None, true)
            .await
            .unwrap();

        let err = session
            .click(&ClickTarget::Selector("#compose".into()), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::NavigationFailed { .. }));
    }

    #[tokio::test]
    async fn tab_lifecycle() {
        let (session, _) = session(inbox_driver()).await;

        let name = session.open_tab(None, Some("docs".into())).await.unwrap();
        assert_eq!(name, "docs");
        assert_eq!(session.current_tab().name, "docs");

        session.switch_tab(MAIN_TAB).await.unwrap();
        assert_eq!(session.current_tab().name, MAIN_TAB);

        session.close_tab("docs").await.unwrap();
        assert_eq!(session.list_tabs().len(), 1);

        let err = session.close_tab("docs").await.unwrap_err();
        assert!(matches!(err, BrowserError::TabNotFound { .. }));
    }

    #[tokio::test]
    async fn main_tab_cannot_be_closed() {
        let (session, _) = session(ScriptedDriver::new()).await;
        let err = session.close_tab(MAIN_TAB).await.unwrap_err();
        assert!(matches!(err, BrowserError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn generated_tab_names_are_unique() {
        let (session, _) = session(ScriptedDriver::new()).await;
        let a = session.open_tab(None, None).await.unwrap();
        let b = session.open_tab(None, None).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn unknown_target_tab_is_rejected() {
        let (session, _) = session(ScriptedDriver::new()).await;
        let err = session
            .navigate("https://example.com", Some("ghost"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BrowserError::TabNotFound { .. }));
    }

    #[tokio::test]
    async fn wait_requires_selector_or_duration() {
        let (session, _) = session(ScriptedDriver::new()).await;
        let err = session.wait(None, None, None).await.unwrap_err();
        assert!(matches!(err, BrowserError::InvalidOperation { .. }));
    }

    #[tokio::test]
    async fn reset_closes_auxiliary_tabs_and_blanks_main() {
        let (session, _) = session(inbox_driver()).await;
        session
            .navigate("https://mail.example.com/inbox", None, true)
            .await
            .unwrap();
        session.open_tab(None, Some("aux".into())).await.unwrap();

        session.reset().await.unwrap();

        let state = session.state();
        assert_eq!(state.tabs.len(), 1);
        assert_eq!(state.active_tab_name, MAIN_TAB);
        assert_eq!(state.tabs[0].url, "about:blank");
    }

    #[tokio::test]
    async fn screenshot_is_base64() {
        let (session, _) = session(ScriptedDriver::new()).await;
        let shot = session.screenshot(None, false).await.unwrap();
        assert_eq!(shot.tab, MAIN_TAB);
        assert!(!shot.base64_png.is_empty());
        assert!(BASE64.decode(&shot.base64_png).is_ok());
    }
}
