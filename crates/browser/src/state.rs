//! The browser-state snapshot.
//!
//! Updated exclusively by session mutations, persisted per workflow, and
//! emitted on the event bus so external consumers (the Director UI, the
//! debugger) always see the current tab layout.

use serde::{Deserialize, Serialize};

/// One tab as seen by external consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    /// Tab name (`main`, or the name given at open time).
    pub name: String,
    /// Current URL.
    pub url: String,
    /// Current page title.
    pub title: String,
    /// Whether this is the active tab.
    pub is_active: bool,
}

/// The full snapshot: all tabs plus the active-tab pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserState {
    /// All open tabs, in open order (main first).
    pub tabs: Vec<TabInfo>,
    /// Name of the active tab.
    pub active_tab_name: String,
}

impl BrowserState {
    /// Look up a tab by name.
    #[must_use]
    pub fn tab(&self, name: &str) -> Option<&TabInfo> {
        self.tabs.iter().find(|tab| tab.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_camel_case() {
        let state = BrowserState {
            tabs: vec![TabInfo {
                name: "main".into(),
                url: "https://mail.example.com".into(),
                title: "Inbox".into(),
                is_active: true,
            }],
            active_tab_name: "main".into(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["activeTabName"], json!("main"));
        assert_eq!(json["tabs"][0]["isActive"], json!(true));
    }

    #[test]
    fn tab_lookup() {
        let state = BrowserState {
            tabs: vec![TabInfo {
                name: "main".into(),
                url: String::new(),
                title: String::new(),
                is_active: true,
            }],
            active_tab_name: "main".into(),
        };
        assert!(state.tab("main").is_some());
        assert!(state.tab("aux").is_none());
    }
}
