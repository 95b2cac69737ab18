//! Scripted driver for hermetic tests.
//!
//! Implements [`BrowserDriver`] against a scripted page world: pages are
//! declared up front (URL → title + selectors), clicks and AI actions
//! apply declared effects, and AI extraction replays scripted results.
//! Every operation is recorded so tests can assert exactly what ran.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{Value, json};
use webpilot_ai::AiError;

use crate::driver::{BrowserDriver, ClickTarget};
use crate::error::BrowserError;

/// A declared page: title, selectors present on load, optional redirect.
#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    title: String,
    selectors: Vec<String>,
    redirect: Option<String>,
}

impl PageSpec {
    /// A page with a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Selectors present when the page loads.
    #[must_use]
    pub fn with_selectors<I, S>(mut self, selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selectors = selectors.into_iter().map(Into::into).collect();
        self
    }

    /// Navigating here lands on another URL instead.
    #[must_use]
    pub fn with_redirect(mut self, url: impl Into<String>) -> Self {
        self.redirect = Some(url.into());
        self
    }
}

/// Page mutation applied by a scripted click or AI action.
#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    removes: Vec<String>,
    adds: Vec<String>,
    navigates_to: Option<String>,
}

impl ClickEffect {
    /// Remove a selector from the page.
    #[must_use]
    pub fn removing_selector(mut self, selector: impl Into<String>) -> Self {
        self.removes.push(selector.into());
        self
    }

    /// Add a selector to the page.
    #[must_use]
    pub fn adding_selector(mut self, selector: impl Into<String>) -> Self {
        self.adds.push(selector.into());
        self
    }

    /// Navigate the tab.
    #[must_use]
    pub fn navigating_to(mut self, url: impl Into<String>) -> Self {
        self.navigates_to = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
struct TabState {
    url: String,
    title: String,
    elements: HashSet<String>,
    history: Vec<String>,
    history_index: usize,
}

#[derive(Default)]
struct Inner {
    pages: HashMap<String, PageSpec>,
    tabs: HashMap<String, TabState>,
    click_effects: HashMap<String, ClickEffect>,
    extractions: HashMap<String, Value>,
    counts: HashMap<String, u64>,
    ai_extracts: HashMap<String, VecDeque<Result<Value, AiError>>>,
    ai_acts: HashMap<String, VecDeque<Result<ClickEffect, AiError>>>,
    ai_assessments: HashMap<String, bool>,
    element_details: HashMap<String, Value>,
    log: Vec<String>,
}

/// The scripted [`BrowserDriver`].
#[derive(Default)]
pub struct ScriptedDriver {
    inner: Mutex<Inner>,
}

impl ScriptedDriver {
    /// An empty world (every URL is a blank page).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a page.
    #[must_use]
    pub fn with_page(self, url: impl Into<String>, spec: PageSpec) -> Self {
        self.inner.lock().pages.insert(url.into(), spec);
        self
    }

    /// Declare what clicking a selector does.
    #[must_use]
    pub fn with_click_effect(self, selector: impl Into<String>, effect: ClickEffect) -> Self {
        self.inner.lock().click_effects.insert(selector.into(), effect);
        self
    }

    /// Script the result of deterministic extraction on a selector.
    #[must_use]
    pub fn with_extraction(self, selector: impl Into<String>, rows: Value) -> Self {
        self.inner.lock().extractions.insert(selector.into(), rows);
        self
    }

    /// Script a match count for a selector.
    #[must_use]
    pub fn with_count(self, selector: impl Into<String>, count: u64) -> Self {
        self.inner.lock().counts.insert(selector.into(), count);
        self
    }

    /// Script one AI-extraction result for an instruction (results for
    /// the same instruction replay in order; the last one repeats).
    #[must_use]
    pub fn with_ai_extract(self, instruction: impl Into<String>, result: Value) -> Self {
        self.with_ai_extract_outcome(instruction, Ok(result))
    }

    /// Script an AI-extraction outcome, including failures.
    #[must_use]
    pub fn with_ai_extract_outcome(
        self,
        instruction: impl Into<String>,
        outcome: Result<Value, AiError>,
    ) -> Self {
        self.inner
            .lock()
            .ai_extracts
            .entry(instruction.into())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Script an AI action's page effect.
    #[must_use]
    pub fn with_ai_act(self, instruction: impl Into<String>, effect: ClickEffect) -> Self {
        self.with_ai_act_outcome(instruction, Ok(effect))
    }

    /// Script an AI action outcome, including failures.
    #[must_use]
    pub fn with_ai_act_outcome(
        self,
        instruction: impl Into<String>,
        outcome: Result<ClickEffect, AiError>,
    ) -> Self {
        self.inner
            .lock()
            .ai_acts
            .entry(instruction.into())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Script an AI assessment verdict (unscripted assessments pass).
    #[must_use]
    pub fn with_ai_assessment(self, instruction: impl Into<String>, verdict: bool) -> Self {
        self.inner
            .lock()
            .ai_assessments
            .insert(instruction.into(), verdict);
        self
    }

    /// Script an element detail for `expand_dom_selector`.
    #[must_use]
    pub fn with_element_detail(self, element_id: impl Into<String>, detail: Value) -> Self {
        self.inner
            .lock()
            .element_details
            .insert(element_id.into(), detail);
        self
    }

    /// Every operation performed, in order (`"click main #compose"`).
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.inner.lock().log.clone()
    }

    fn record(inner: &mut Inner, entry: String) {
        inner.log.push(entry);
    }

    fn tab_mut<'a>(inner: &'a mut Inner, tab: &str) -> Result<&'a mut TabState, BrowserError> {
        inner.tabs.get_mut(tab).ok_or_else(|| BrowserError::Driver {
            reason: format!("no page for tab {tab:?}"),
        })
    }

    fn load(inner: &mut Inner, tab: &str, url: &str) -> Result<(), BrowserError> {
        // Follow one scripted redirect hop, if any.
        let landed = match inner.pages.get(url).and_then(|spec| spec.redirect.clone()) {
            Some(target) => target,
            None => url.to_owned(),
        };
        let (title, elements) = match inner.pages.get(&landed) {
            Some(spec) => (spec.title.clone(), spec.selectors.iter().cloned().collect()),
            None => (String::new(), HashSet::new()),
        };
        let state = Self::tab_mut(inner, tab)?;
        state.history.truncate(state.history_index + 1);
        state.history.push(landed.clone());
        state.history_index = state.history.len() - 1;
        state.url = landed;
        state.title = title;
        state.elements = elements;
        Ok(())
    }

    fn restore_history_entry(inner: &mut Inner, tab: &str) -> Result<(), BrowserError> {
        let state = Self::tab_mut(inner, tab)?;
        let Some(url) = state.history.get(state.history_index).cloned() else {
            return Ok(());
        };
        let (title, elements) = match inner.pages.get(&url) {
            Some(spec) => (spec.title.clone(), spec.selectors.iter().cloned().collect()),
            None => (String::new(), HashSet::new()),
        };
        let state = Self::tab_mut(inner, tab)?;
        state.url = url;
        state.title = title;
        state.elements = elements;
        Ok(())
    }

    fn apply_effect(inner: &mut Inner, tab: &str, effect: &ClickEffect) -> Result<(), BrowserError> {
        {
            let state = Self::tab_mut(inner, tab)?;
            for selector in &effect.removes {
                state.elements.remove(selector);
            }
            for selector in &effect.adds {
                state.elements.insert(selector.clone());
            }
        }
        if let Some(url) = effect.navigates_to.clone() {
            Self::load(inner, tab, &url)?;
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ScriptedDriver {
    async fn open_page(&self, tab: &str, url: Option<&str>) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("open_page {tab}"));
        inner.tabs.insert(tab.to_owned(), TabState::default());
        if let Some(url) = url {
            Self::load(&mut inner, tab, url)?;
        }
        Ok(())
    }

    async fn close_page(&self, tab: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("close_page {tab}"));
        inner.tabs.remove(tab).map(|_| ()).ok_or_else(|| {
            BrowserError::Driver {
                reason: format!("no page for tab {tab:?}"),
            }
        })
    }

    async fn navigate(&self, tab: &str, url: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("navigate {tab} {url}"));
        Self::load(&mut inner, tab, url)
    }

    async fn current_url(&self, tab: &str) -> Result<String, BrowserError> {
        let mut inner = self.inner.lock();
        Ok(Self::tab_mut(&mut inner, tab)?.url.clone())
    }

    async fn title(&self, tab: &str) -> Result<String, BrowserError> {
        let mut inner = self.inner.lock();
        Ok(Self::tab_mut(&mut inner, tab)?.title.clone())
    }

    async fn click(&self, tab: &str, target: &ClickTarget) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        match target {
            ClickTarget::Selector(selector) => {
                Self::record(&mut inner, format!("click {tab} {selector}"));
                if !Self::tab_mut(&mut inner, tab)?.elements.contains(selector) {
                    return Err(BrowserError::SelectorFailed {
                        selector: selector.clone(),
                        reason: "no matching element".into(),
                    });
                }
                if let Some(effect) = inner.click_effects.get(selector).cloned() {
                    Self::apply_effect(&mut inner, tab, &effect)?;
                }
                Ok(())
            }
            ClickTarget::Coords { x, y } => {
                Self::record(&mut inner, format!("click {tab} @{x},{y}"));
                Ok(())
            }
        }
    }

    async fn type_text(&self, tab: &str, selector: &str, text: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("type {tab} {selector} {text:?}"));
        if !Self::tab_mut(&mut inner, tab)?.elements.contains(selector) {
            return Err(BrowserError::SelectorFailed {
                selector: selector.to_owned(),
                reason: "no matching element".into(),
            });
        }
        Ok(())
    }

    async fn keypress(&self, tab: &str, key: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("keypress {tab} {key}"));
        Self::tab_mut(&mut inner, tab).map(|_| ())
    }

    async fn wait_for_selector(
        &self,
        tab: &str,
        selector: &str,
        deadline: Duration,
    ) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("wait {tab} {selector}"));
        if Self::tab_mut(&mut inner, tab)?.elements.contains(selector) {
            Ok(())
        } else {
            Err(BrowserError::Timeout {
                op: format!("wait for {selector}"),
                deadline,
            })
        }
    }

    async fn back(&self, tab: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("back {tab}"));
        let moved = {
            let state = Self::tab_mut(&mut inner, tab)?;
            if state.history_index > 0 {
                state.history_index -= 1;
                true
            } else {
                false
            }
        };
        if moved {
            Self::restore_history_entry(&mut inner, tab)?;
        }
        Ok(())
    }

    async fn forward(&self, tab: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("forward {tab}"));
        let moved = {
            let state = Self::tab_mut(&mut inner, tab)?;
            if state.history_index + 1 < state.history.len() {
                state.history_index += 1;
                true
            } else {
                false
            }
        };
        if moved {
            Self::restore_history_entry(&mut inner, tab)?;
        }
        Ok(())
    }

    async fn reload(&self, tab: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("reload {tab}"));
        Self::restore_history_entry(&mut inner, tab)
    }

    async fn screenshot(&self, tab: &str, full_page: bool) -> Result<Vec<u8>, BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("screenshot {tab} full_page={full_page}"));
        Self::tab_mut(&mut inner, tab)?;
        Ok(b"\x89PNG scripted".to_vec())
    }

    async fn selector_exists(&self, tab: &str, selector: &str) -> Result<bool, BrowserError> {
        let mut inner = self.inner.lock();
        Ok(Self::tab_mut(&mut inner, tab)?.elements.contains(selector))
    }

    async fn count(&self, tab: &str, selector: &str) -> Result<u64, BrowserError> {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.counts.get(selector).copied() {
            return Ok(count);
        }
        Ok(u64::from(
            Self::tab_mut(&mut inner, tab)?.elements.contains(selector),
        ))
    }

    async fn extract_fields(
        &self,
        tab: &str,
        selector: &str,
        fields: &IndexMap<String, String>,
    ) -> Result<Value, BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("extract {tab} {selector}"));
        if let Some(rows) = inner.extractions.get(selector).cloned() {
            return Ok(rows);
        }
        if Self::tab_mut(&mut inner, tab)?.elements.contains(selector) {
            // One empty row per declared field keeps the shape honest.
            let row: serde_json::Map<String, Value> = fields
                .keys()
                .map(|name| (name.clone(), Value::Null))
                .collect();
            Ok(json!([row]))
        } else {
            Err(BrowserError::SelectorFailed {
                selector: selector.to_owned(),
                reason: "no matching element".into(),
            })
        }
    }

    async fn ai_extract(
        &self,
        tab: &str,
        instruction: &str,
        _schema: &Value,
    ) -> Result<Value, BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("ai_extract {tab} {instruction}"));
        let queue = inner
            .ai_extracts
            .get_mut(instruction)
            .ok_or_else(|| BrowserError::Driver {
                reason: format!("unscripted ai_extract: {instruction:?}"),
            })?;
        let outcome = if queue.len() > 1 {
            queue.pop_front().expect("len checked")
        } else {
            queue.front().cloned().ok_or_else(|| BrowserError::Driver {
                reason: format!("exhausted ai_extract script: {instruction:?}"),
            })?
        };
        outcome.map_err(BrowserError::from)
    }

    async fn ai_act(&self, tab: &str, instruction: &str) -> Result<(), BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("ai_act {tab} {instruction}"));
        let outcome = match inner.ai_acts.get_mut(instruction) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("len checked"),
            Some(queue) => queue.front().cloned().unwrap_or(Ok(ClickEffect::default())),
            None => Ok(ClickEffect::default()),
        };
        let effect = outcome.map_err(BrowserError::from)?;
        Self::apply_effect(&mut inner, tab, &effect)
    }

    async fn ai_assess(&self, tab: &str, instruction: &str) -> Result<bool, BrowserError> {
        let mut inner = self.inner.lock();
        Self::record(&mut inner, format!("ai_assess {tab} {instruction}"));
        Ok(inner.ai_assessments.get(instruction).copied().unwrap_or(true))
    }

    async fn accessibility_snapshot(&self, tab: &str) -> Result<Value, BrowserError> {
        let mut inner = self.inner.lock();
        let state = Self::tab_mut(&mut inner, tab)?;
        let mut elements: Vec<&String> = state.elements.iter().collect();
        elements.sort();
        Ok(json!({
            "url": state.url,
            "title": state.title,
            "elements": elements
                .into_iter()
                .enumerate()
                .map(|(i, selector)| json!({"id": format!("el_{i}"), "selector": selector}))
                .collect::<Vec<_>>(),
        }))
    }

    async fn element_detail(&self, _tab: &str, element_id: &str) -> Result<Value, BrowserError> {
        let inner = self.inner.lock();
        inner
            .element_details
            .get(element_id)
            .cloned()
            .ok_or_else(|| BrowserError::Driver {
                reason: format!("unknown element id {element_id:?}"),
            })
    }
}
