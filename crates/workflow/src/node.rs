//! The node model.
//!
//! A node is one step of a workflow: a 1-based position, a unique alias,
//! a type-specific config, and optional auxiliary params. Configs form a
//! tagged union over `type`; every string leaf (and nested structure)
//! may contain `{{ }}` templates, so template-bearing fields stay as
//! plain strings or [`serde_json::Value`]s until the executor resolves
//! them.

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use webpilot_core::{Alias, Position};

/// One step of a workflow.
///
/// Serialized as `{ position, alias, type, config, params? }`, with
/// `config` parsed per `type` into the matching [`NodeConfig`] variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NodeWire", into = "NodeWire")]
pub struct Node {
    /// 1-based ordinal within the workflow.
    pub position: Position,
    /// Unique symbolic name.
    pub alias: Alias,
    /// Type-specific configuration.
    pub config: NodeConfig,
    /// Auxiliary inputs, template-resolved alongside the config.
    pub params: Option<Value>,
}

/// A node definition as submitted by the Director: everything but the
/// position, which the edit machinery assigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "DraftWire", into = "DraftWire")]
pub struct NodeDraft {
    /// Unique symbolic name.
    pub alias: Alias,
    /// Type-specific configuration.
    pub config: NodeConfig,
    /// Auxiliary inputs.
    pub params: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct NodeWire {
    position: Position,
    alias: Alias,
    #[serde(rename = "type")]
    node_type: NodeType,
    config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct DraftWire {
    alias: Alias,
    #[serde(rename = "type")]
    node_type: NodeType,
    config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl TryFrom<NodeWire> for Node {
    type Error = String;

    fn try_from(wire: NodeWire) -> Result<Self, Self::Error> {
        Ok(Self {
            position: wire.position,
            alias: wire.alias,
            config: NodeConfig::from_wire(wire.node_type, wire.config)?,
            params: wire.params,
        })
    }
}

impl From<Node> for NodeWire {
    fn from(node: Node) -> Self {
        let (node_type, config) = node.config.to_wire();
        Self {
            position: node.position,
            alias: node.alias,
            node_type,
            config,
            params: node.params,
        }
    }
}

impl TryFrom<DraftWire> for NodeDraft {
    type Error = String;

    fn try_from(wire: DraftWire) -> Result<Self, Self::Error> {
        Ok(Self {
            alias: wire.alias,
            config: NodeConfig::from_wire(wire.node_type, wire.config)?,
            params: wire.params,
        })
    }
}

impl From<NodeDraft> for DraftWire {
    fn from(draft: NodeDraft) -> Self {
        let (node_type, config) = draft.config.to_wire();
        Self {
            alias: draft.alias,
            node_type,
            config,
            params: draft.params,
        }
    }
}

impl NodeDraft {
    /// Place the draft at a position.
    #[must_use]
    pub fn at(self, position: Position) -> Node {
        Node {
            position,
            alias: self.alias,
            config: self.config,
            params: self.params,
        }
    }
}

/// The node type discriminant, used in reports and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Writes variables into the global store.
    Context,
    /// A single deterministic browser operation.
    BrowserAction,
    /// A deterministic DOM query.
    BrowserQuery,
    /// AI extraction with a declared schema.
    BrowserAiExtract,
    /// AI-performed page action.
    BrowserAiAct,
    /// External text generation.
    Cognition,
    /// Loop over an array or a set of records.
    Iterate,
    /// Multi-branch routing.
    Route,
    /// Rule-based assertion.
    Validation,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Context => "context",
            Self::BrowserAction => "browser_action",
            Self::BrowserQuery => "browser_query",
            Self::BrowserAiExtract => "browser_ai_extract",
            Self::BrowserAiAct => "browser_ai_act",
            Self::Cognition => "cognition",
            Self::Iterate => "iterate",
            Self::Route => "route",
            Self::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// Tagged union of per-type configurations.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    /// Write variables into the global store.
    Context(ContextConfig),
    /// One deterministic browser operation.
    BrowserAction(BrowserActionConfig),
    /// One deterministic DOM query.
    BrowserQuery(BrowserQueryConfig),
    /// AI extraction against a schema.
    BrowserAiExtract(AiExtractConfig),
    /// AI-performed page action.
    BrowserAiAct(AiActConfig),
    /// External text generation.
    Cognition(CognitionConfig),
    /// Iteration container.
    Iterate(IterateConfig),
    /// Routing container.
    Route(RouteConfig),
    /// Rule-based assertion.
    Validation(ValidationConfig),
}

impl NodeConfig {
    /// The type discriminant.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Context(_) => NodeType::Context,
            Self::BrowserAction(_) => NodeType::BrowserAction,
            Self::BrowserQuery(_) => NodeType::BrowserQuery,
            Self::BrowserAiExtract(_) => NodeType::BrowserAiExtract,
            Self::BrowserAiAct(_) => NodeType::BrowserAiAct,
            Self::Cognition(_) => NodeType::Cognition,
            Self::Iterate(_) => NodeType::Iterate,
            Self::Route(_) => NodeType::Route,
            Self::Validation(_) => NodeType::Validation,
        }
    }

    /// Parse a config value for a node type.
    fn from_wire(node_type: NodeType, config: Value) -> Result<Self, String> {
        fn parse<T: serde::de::DeserializeOwned>(
            node_type: NodeType,
            config: Value,
        ) -> Result<T, String> {
            serde_json::from_value(config)
                .map_err(|err| format!("invalid {node_type} config: {err}"))
        }

        Ok(match node_type {
            NodeType::Context => Self::Context(parse(node_type, config)?),
            NodeType::BrowserAction => Self::BrowserAction(parse(node_type, config)?),
            NodeType::BrowserQuery => Self::BrowserQuery(parse(node_type, config)?),
            NodeType::BrowserAiExtract => Self::BrowserAiExtract(parse(node_type, config)?),
            NodeType::BrowserAiAct => Self::BrowserAiAct(parse(node_type, config)?),
            NodeType::Cognition => Self::Cognition(parse(node_type, config)?),
            NodeType::Iterate => Self::Iterate(parse(node_type, config)?),
            NodeType::Route => Self::Route(parse(node_type, config)?),
            NodeType::Validation => Self::Validation(parse(node_type, config)?),
        })
    }

    /// Serialize to the wire pair `(type, config)`.
    ///
    /// Config structs serialize infallibly; a failure here would mean a
    /// non-JSON-representable value got into a config, which the wire
    /// layer has already excluded.
    fn to_wire(&self) -> (NodeType, Value) {
        let config = match self {
            Self::Context(c) => serde_json::to_value(c),
            Self::BrowserAction(c) => serde_json::to_value(c),
            Self::BrowserQuery(c) => serde_json::to_value(c),
            Self::BrowserAiExtract(c) => serde_json::to_value(c),
            Self::BrowserAiAct(c) => serde_json::to_value(c),
            Self::Cognition(c) => serde_json::to_value(c),
            Self::Iterate(c) => serde_json::to_value(c),
            Self::Route(c) => serde_json::to_value(c),
            Self::Validation(c) => serde_json::to_value(c),
        };
        (self.node_type(), config.unwrap_or(Value::Null))
    }
}

/// `context` -- variables written as declared, no namespacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Keys and (template-bearing) values to write.
    pub variables: IndexMap<String, Value>,
}

/// `browser_action` -- one deterministic browser operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserActionConfig {
    /// The operation to perform.
    #[serde(flatten)]
    pub op: BrowserOp,
    /// Post-execution store mapping (screenshots store their artifact).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreSpec>,
    /// Attribute writes to the current record inside record iteration.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub store_to_record: bool,
}

/// The deterministic browser operations, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BrowserOp {
    /// Load a URL.
    Navigate {
        /// Destination URL (template-bearing).
        url: String,
        /// Target tab; the active tab when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
        /// Confirm the landing URL after navigation.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validate_landing: Option<bool>,
    },
    /// Click a selector or a coordinate pair.
    Click {
        /// CSS selector to click.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// `[x, y]` viewport coordinates.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        coords: Option<[f64; 2]>,
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
        /// The click is expected to progress the page: afterwards the
        /// selector must be gone or the URL changed.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        expect_progress: bool,
    },
    /// Type text into a selector.
    Type {
        /// CSS selector of the input.
        selector: String,
        /// Text to type (template-bearing).
        text: String,
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
        /// The input is expected to progress the page (e.g. search-as-you-type).
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        expect_progress: bool,
    },
    /// Press a key.
    Keypress {
        /// Key name (`Enter`, `Tab`, ...).
        key: String,
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
    /// Wait for a selector or a fixed duration.
    Wait {
        /// CSS selector to wait for.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<String>,
        /// Milliseconds to wait.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
    /// Open a new named tab.
    OpenTab {
        /// Initial URL.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Tab name; generated when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Close a named tab.
    CloseTab {
        /// The tab to close.
        name: String,
    },
    /// Make a tab active.
    SwitchTab {
        /// The tab to activate.
        name: String,
    },
    /// History back.
    Back {
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
    /// History forward.
    Forward {
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
    /// Reload the page.
    Reload {
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
    /// Capture a screenshot.
    Screenshot {
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
        /// Capture the full page instead of the viewport.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        full_page: bool,
    },
}

/// `browser_query` -- deterministic DOM queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowserQueryConfig {
    /// Which query to run.
    pub query: QueryKind,
    /// CSS selector the query targets.
    pub selector: String,
    /// For `extract`: field name → attribute/text selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<IndexMap<String, String>>,
    /// Target tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    /// Post-execution store mapping.
    #[serde(flatten)]
    pub effects: EffectsSpec,
}

/// Deterministic query kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Extract mapped values from every match.
    Extract,
    /// Assert at least one match exists.
    Exists,
    /// Assert no match exists.
    Absent,
    /// Count matches.
    Count,
}

/// `browser_ai_extract` -- instruction + schema, validated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiExtractConfig {
    /// Natural-language extraction instruction.
    pub instruction: String,
    /// Declared output schema (JSON-Schema subset).
    pub schema: Value,
    /// Target tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    /// Post-execution store mapping and record creation.
    #[serde(flatten)]
    pub effects: EffectsSpec,
}

/// `browser_ai_act` -- one natural-language page action, no structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiActConfig {
    /// Natural-language action instruction.
    pub instruction: String,
    /// Target tab.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
}

/// `cognition` -- external text generation, optionally schema-validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitionConfig {
    /// Generation instruction.
    pub instruction: String,
    /// Additional inputs handed to the generator (template-bearing).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    /// Declared output schema; free text when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    /// Post-execution store mapping and record creation.
    #[serde(flatten)]
    pub effects: EffectsSpec,
}

/// `validation` -- evaluate all rules, fail the node on any failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// The rules, all of which must pass.
    pub rules: Vec<ValidationRule>,
}

/// One validation rule, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    /// The selector must match at least one element.
    ElementExists {
        /// CSS selector to probe.
        selector: String,
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
    /// The selector must match nothing.
    ElementAbsent {
        /// CSS selector to probe.
        selector: String,
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
    /// An AI judgment over the page must come back affirmative.
    AiAssessment {
        /// What to assess.
        instruction: String,
        /// Target tab.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tab: Option<String>,
    },
}

/// `iterate` -- loop container, two modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IterateConfig {
    /// Iterate over an array bound to a named variable.
    Items {
        /// Template resolving to the array (`"{{extract.emails}}"`).
        over: String,
        /// Binding name for the element; `<name>Index`/`<name>Total`
        /// are bound alongside.
        variable: String,
        /// Symbolic body references.
        body: Vec<NodeRef>,
        /// Resolved body positions, refreshed after every edit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body_positions: Option<Vec<Position>>,
        /// Whether an iteration failure aborts or continues.
        #[serde(default, skip_serializing_if = "is_default_on_error")]
        on_error: OnError,
    },
    /// Iterate over records matching a pattern.
    Records {
        /// Record pattern (`"email_*"`).
        over_records: String,
        /// Binding name for the current record's merged view.
        #[serde(rename = "as")]
        as_name: String,
        /// Symbolic body references.
        body: Vec<NodeRef>,
        /// Resolved body positions, refreshed after every edit.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body_positions: Option<Vec<Position>>,
        /// Whether an iteration failure aborts or continues.
        #[serde(default, skip_serializing_if = "is_default_on_error")]
        on_error: OnError,
    },
}

impl IterateConfig {
    /// The symbolic body references.
    #[must_use]
    pub fn body(&self) -> &[NodeRef] {
        match self {
            Self::Items { body, .. } | Self::Records { body, .. } => body,
        }
    }

    /// The resolved body positions, if present.
    #[must_use]
    pub fn body_positions(&self) -> Option<&[Position]> {
        match self {
            Self::Items { body_positions, .. } | Self::Records { body_positions, .. } => {
                body_positions.as_deref()
            }
        }
    }

    /// Store the resolved body positions.
    pub fn set_body_positions(&mut self, positions: Vec<Position>) {
        match self {
            Self::Items { body_positions, .. } | Self::Records { body_positions, .. } => {
                *body_positions = Some(positions);
            }
        }
    }

    /// The error policy.
    #[must_use]
    pub fn on_error(&self) -> OnError {
        match self {
            Self::Items { on_error, .. } | Self::Records { on_error, .. } => *on_error,
        }
    }
}

/// Iteration error policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnError {
    /// First inner failure fails the whole iterate node.
    #[default]
    Abort,
    /// Mark the iteration failed and continue with the next element.
    Continue,
}

fn is_default_on_error(on_error: &OnError) -> bool {
    *on_error == OnError::default()
}

/// `route` -- routing container, two modes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteConfig {
    /// Collection mode: partition records, then run every route's branch.
    Collection {
        /// Must be the string `"collection"`.
        mode: CollectionMode,
        /// Record pattern to partition.
        over: String,
        /// The routes, evaluated per record in order.
        routes: Vec<RouteBranch>,
    },
    /// Single mode: first true condition selects the only branch to run.
    Single(Vec<RouteBranch>),
}

/// Marker for the collection-mode discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMode {
    /// The only value: `"collection"`.
    Collection,
}

impl RouteConfig {
    /// All branches, regardless of mode.
    #[must_use]
    pub fn branches(&self) -> &[RouteBranch] {
        match self {
            Self::Single(branches) => branches,
            Self::Collection { routes, .. } => routes,
        }
    }

    /// Mutable access to all branches.
    pub fn branches_mut(&mut self) -> &mut [RouteBranch] {
        match self {
            Self::Single(branches) => branches,
            Self::Collection { routes, .. } => routes,
        }
    }
}

/// One route entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteBranch {
    /// Route name; collection partitions surface as `{{route.<name>}}`.
    pub name: String,
    /// Condition in the `path OP value` mini-language.
    pub condition: String,
    /// Symbolic branch references.
    pub branch: Vec<NodeRef>,
    /// Resolved branch positions, refreshed after every edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_positions: Option<Vec<Position>>,
}

/// A symbolic reference to workflow nodes: an alias, a raw position, or
/// an inclusive alias range (`"start..end"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRef {
    /// By alias.
    Alias(Alias),
    /// By raw position.
    Position(Position),
    /// An inclusive alias range.
    Range {
        /// First alias of the range.
        start: Alias,
        /// Last alias of the range; its position must not precede the start's.
        end: Alias,
    },
}

impl Serialize for NodeRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Alias(alias) => serializer.serialize_str(alias.as_str()),
            Self::Position(position) => serializer.serialize_u32(position.get()),
            Self::Range { start, end } => {
                serializer.serialize_str(&format!("{start}..{end}"))
            }
        }
    }
}

impl<'de> Deserialize<'de> for NodeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Number(n) => {
                let ordinal = n
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .and_then(Position::new)
                    .ok_or_else(|| D::Error::custom(format!("invalid position {n}")))?;
                Ok(Self::Position(ordinal))
            }
            Value::String(s) => {
                if let Some((start, end)) = s.split_once("..") {
                    let start = start
                        .parse::<Alias>()
                        .map_err(|e| D::Error::custom(format!("range start: {e}")))?;
                    let end = end
                        .parse::<Alias>()
                        .map_err(|e| D::Error::custom(format!("range end: {e}")))?;
                    Ok(Self::Range { start, end })
                } else {
                    s.parse::<Alias>().map(Self::Alias).map_err(D::Error::custom)
                }
            }
            other => Err(D::Error::custom(format!(
                "node reference must be an alias, position, or range, got {other}"
            ))),
        }
    }
}

/// Post-execution effects shared by result-producing node types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectsSpec {
    /// What to write into the node's global namespace (or current record).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreSpec>,
    /// Create one record per element of an array result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_records: Option<CreateRecordsSpec>,
    /// Attribute writes to the current record inside record iteration.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub store_to_record: bool,
}

/// The `store` declaration: `true`, `"*"`, or `{ targetKey: sourcePath }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSpec {
    /// `true` ≡ `{ "result": "result" }`.
    Result,
    /// `"*"` -- every top-level scalar/array field of the result, by name.
    All,
    /// Explicit target-key → source-path mapping.
    Map(IndexMap<String, String>),
}

impl Serialize for StoreSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Result => serializer.serialize_bool(true),
            Self::All => serializer.serialize_str("*"),
            Self::Map(map) => map.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StoreSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Bool(true) => Ok(Self::Result),
            Value::Bool(false) => Err(D::Error::custom(
                "store: false is meaningless; omit the field instead",
            )),
            Value::String(s) if s == "*" => Ok(Self::All),
            Value::String(other) => Err(D::Error::custom(format!(
                "store must be true, \"*\", or a mapping, got {other:?}"
            ))),
            Value::Object(map) => {
                let mut mapping = IndexMap::with_capacity(map.len());
                for (key, item) in map {
                    match item {
                        Value::String(path) => {
                            mapping.insert(key, path);
                        }
                        other => {
                            return Err(D::Error::custom(format!(
                                "store mapping for {key:?} must be a source path, got {other}"
                            )));
                        }
                    }
                }
                Ok(Self::Map(mapping))
            }
            other => Err(D::Error::custom(format!(
                "store must be true, \"*\", or a mapping, got {other}"
            ))),
        }
    }
}

/// The `create_records` declaration: a record type, or
/// `{ type, id_pattern }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRecordsSpec {
    /// The record type (`"email"` → ids like `email_001`).
    pub record_type: String,
    /// Id pattern template; defaults to `<type>_{index}` with the index
    /// zero-padded to width 3.
    pub id_pattern: Option<String>,
}

impl Serialize for CreateRecordsSpec {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.id_pattern {
            None => serializer.serialize_str(&self.record_type),
            Some(pattern) => {
                use serde::ser::SerializeMap;
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", &self.record_type)?;
                map.serialize_entry("id_pattern", pattern)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for CreateRecordsSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Full {
            #[serde(rename = "type")]
            record_type: String,
            #[serde(default)]
            id_pattern: Option<String>,
        }

        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(record_type) => Ok(Self {
                record_type,
                id_pattern: None,
            }),
            object @ Value::Object(_) => {
                let full: Full = serde_json::from_value(object).map_err(D::Error::custom)?;
                Ok(Self {
                    record_type: full.record_type,
                    id_pattern: full.id_pattern,
                })
            }
            other => Err(D::Error::custom(format!(
                "create_records must be a type name or an object, got {other}"
            ))),
        }
    }
}

impl Node {
    /// The node's type discriminant.
    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }
}
