//! End-to-end engine scenarios against the scripted browser driver and
//! a scripted text generator.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use webpilot_ai::{AiError, GenerateRequest, TextGenerator};
use webpilot_browser::{BrowserSession, PageSpec, ScriptedDriver};
use webpilot_core::{Position, WorkflowId};
use webpilot_engine::{Executor, NodeStatus, RunStatus};
use webpilot_store::{MemoryStore, RecordStatus, StoreBackend};
use webpilot_telemetry::{EventBus, MetricsRegistry};
use webpilot_workflow::{EditTarget, NodeConfig, NodeDraft, Workflow, add_or_replace_nodes};

/// Generator answering by instruction; unscripted instructions refuse.
struct ScriptedGenerator {
    answers: HashMap<String, Value>,
}

impl ScriptedGenerator {
    fn new() -> Self {
        Self {
            answers: HashMap::new(),
        }
    }

    fn answering(mut self, instruction: &str, answer: Value) -> Self {
        self.answers.insert(instruction.to_owned(), answer);
        self
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerateRequest) -> Result<Value, AiError> {
        self.answers
            .get(&request.instruction)
            .cloned()
            .ok_or_else(|| AiError::Refused {
                reason: format!("unscripted instruction {:?}", request.instruction),
            })
    }
}

struct Harness {
    workflow: Workflow,
    executor: Executor,
    store: Arc<MemoryStore>,
    driver: Arc<ScriptedDriver>,
    workflow_id: WorkflowId,
}

impl Harness {
    async fn new(driver: ScriptedDriver, generator: ScriptedGenerator, nodes: Value) -> Self {
        let store = Arc::new(MemoryStore::new());
        let events = Arc::new(EventBus::new(256));
        let driver = Arc::new(driver);
        let workflow_id = WorkflowId::v4();

        let session = BrowserSession::open(
            driver.clone() as Arc<dyn webpilot_browser::BrowserDriver>,
            store.clone() as Arc<dyn StoreBackend>,
            events.clone(),
            workflow_id,
        )
        .await
        .expect("session opens");

        let executor = Executor::new(
            workflow_id,
            store.clone(),
            Arc::new(session),
            Arc::new(generator),
            events,
            Arc::new(MetricsRegistry::new()),
        );

        let mut workflow = Workflow::new(workflow_id);
        let drafts: Vec<NodeDraft> = serde_json::from_value(nodes).expect("valid node drafts");
        add_or_replace_nodes(&mut workflow, &EditTarget::End, drafts).expect("drafts insert");

        Self {
            workflow,
            executor,
            store,
            driver,
            workflow_id,
        }
    }

    async fn global(&self, key: &str) -> Option<Value> {
        self.store.get_global(self.workflow_id, key).await.unwrap()
    }
}

fn context_marker(alias: &str, key: &str, value: Value) -> Value {
    json!({
        "alias": alias,
        "type": "context",
        "config": {"variables": {key: value}}
    })
}

// ── Scenario 1: context + template ─────────────────────────────────────

#[tokio::test]
async fn context_nodes_write_and_template_resolves() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "setup",
                "type": "context",
                "config": {"variables": {"apiKey": "sk-123", "max": 3}}
            },
            {
                "alias": "label",
                "type": "context",
                "config": {"variables": {"label": "key={{apiKey}}"}}
            }
        ]),
    )
    .await;

    let report = h.executor.execute(&h.workflow, "all", false).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(h.global("apiKey").await, Some(json!("sk-123")));
    assert_eq!(h.global("max").await, Some(json!(3)));
    assert_eq!(h.global("label").await, Some(json!("key=sk-123")));
}

// ── Scenario 2: extraction + records + record iteration ────────────────

#[tokio::test]
async fn extraction_creates_records_and_iteration_attributes_writes() {
    let driver = ScriptedDriver::new().with_ai_extract(
        "Extract every email row",
        json!([
            {"subject": "A", "sender": "x@y"},
            {"subject": "B", "sender": "z@w"}
        ]),
    );
    let generator =
        ScriptedGenerator::new().answering("Classify this email", json!("investor"));

    let h = Harness::new(
        driver,
        generator,
        json!([
            {
                "alias": "extract",
                "type": "browser_ai_extract",
                "config": {
                    "instruction": "Extract every email row",
                    "schema": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "subject": {"type": "string"},
                                "sender": {"type": "string"}
                            },
                            "required": ["subject", "sender"]
                        }
                    },
                    "create_records": "email",
                    "store": {"count": "length"}
                }
            },
            {
                "alias": "each_email",
                "type": "iterate",
                "config": {
                    "over_records": "email_*",
                    "as": "email",
                    "body": ["classify"]
                }
            },
            {
                "alias": "classify",
                "type": "cognition",
                "config": {
                    "instruction": "Classify this email",
                    "schema": {"type": "string", "enum": ["investor", "other"]},
                    "store_to_record": true,
                    "store": {"result": "type"}
                }
            }
        ]),
    )
    .await;

    let report = h
        .executor
        .execute(&h.workflow, "extract,each_email", false)
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Completed);

    // Extraction effects: two records, count stored under the alias.
    assert_eq!(h.global("extract.length").await, Some(json!(2)));
    let rec1 = h
        .store
        .get_record(h.workflow_id, "email_001")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec1.data["extract"], json!({"subject": "A", "sender": "x@y"}));
    let rec2 = h
        .store
        .get_record(h.workflow_id, "email_002")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec2.data["extract"], json!({"subject": "B", "sender": "z@w"}));

    // Iteration effects: classification attributed per record, records
    // completed, and no classify globals at all.
    for id in ["email_001", "email_002"] {
        let record = h.store.get_record(h.workflow_id, id).await.unwrap().unwrap();
        assert_eq!(record.data["classify"], json!({"type": "investor"}));
        assert_eq!(record.status, RecordStatus::Completed);
    }
    let classify_globals = h
        .store
        .scan_globals(h.workflow_id, Some("classify."))
        .await
        .unwrap();
    assert!(classify_globals.is_empty());
}

// ── Scenario 3: route with default arm ─────────────────────────────────

#[tokio::test]
async fn route_runs_exactly_the_first_matching_branch() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "setup",
                "type": "context",
                "config": {"variables": {"priority": "low"}}
            },
            {
                "alias": "triage",
                "type": "route",
                "config": [
                    {"name": "h", "condition": "{{priority}} === 'high'", "branch": ["branch_a"]},
                    {"name": "l", "condition": "{{priority}} === 'low'", "branch": ["branch_b"]},
                    {"name": "d", "condition": "true", "branch": ["branch_c"]}
                ]
            },
            context_marker("branch_a", "ran_a", json!(true)),
            context_marker("branch_b", "ran_b", json!(true)),
            context_marker("branch_c", "ran_c", json!(true)),
        ]),
    )
    .await;

    let report = h
        .executor
        .execute(&h.workflow, "setup,triage", false)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.nodes[1].result, Some(json!({"matched": "l"})));
    assert_eq!(h.global("ran_a").await, None);
    assert_eq!(h.global("ran_b").await, Some(json!(true)));
    assert_eq!(h.global("ran_c").await, None);
}

// ── Scenario 4: coercion (numeric-keyed object → array) ────────────────

#[tokio::test]
async fn coerced_array_is_stored_and_iterable() {
    let driver = ScriptedDriver::new()
        .with_ai_extract("List the tags", json!({"0": "x", "1": "y"}));

    let h = Harness::new(
        driver,
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "tags",
                "type": "browser_ai_extract",
                "config": {
                    "instruction": "List the tags",
                    "schema": {"type": "array", "items": {"type": "string"}},
                    "store": true
                }
            },
            {
                "alias": "each_tag",
                "type": "iterate",
                "config": {
                    "over": "{{tags.result}}",
                    "variable": "tag",
                    "body": ["mark"]
                }
            },
            {
                "alias": "mark",
                "type": "context",
                "config": {"variables": {"last_tag": "{{tag}}", "last_index": "{{tagIndex}}"}}
            }
        ]),
    )
    .await;

    let report = h
        .executor
        .execute(&h.workflow, "tags,each_tag", false)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(h.global("tags.result").await, Some(json!(["x", "y"])));
    // The downstream iterate ran twice.
    assert_eq!(
        report.nodes[1].result,
        Some(json!({"iterations": 2, "failed_iterations": []}))
    );
    assert_eq!(h.global("last_tag").await, Some(json!("y")));
    assert_eq!(h.global("last_index").await, Some(json!(1)));
}

// ── Scenario 5: structural edit re-resolves iterate bodies ─────────────

#[tokio::test]
async fn insertion_shifts_positions_but_not_symbolic_bodies() {
    let mut h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([
            context_marker("seed", "items", json!([1])),
            context_marker("f1", "f1", json!(1)),
            context_marker("f2", "f2", json!(1)),
            {
                "alias": "loop",
                "type": "iterate",
                "config": {"over": "{{items}}", "variable": "item", "body": ["a", "b"]}
            },
            context_marker("a", "ran_a", json!(true)),
            context_marker("b", "ran_b", json!(true)),
        ]),
    )
    .await;

    // a=5, b=6 before the edit.
    let index = h.workflow.index().unwrap();
    assert_eq!(
        index.position_of(&"a".parse().unwrap()),
        Position::new(5)
    );
    assert_eq!(
        index.position_of(&"b".parse().unwrap()),
        Position::new(6)
    );

    // Insert c at position 6: b shifts to 7.
    let target: EditTarget = serde_json::from_value(json!(6)).unwrap();
    let drafts: Vec<NodeDraft> =
        serde_json::from_value(json!([context_marker("c", "ran_c", json!(true))])).unwrap();
    add_or_replace_nodes(&mut h.workflow, &target, drafts).unwrap();

    let NodeConfig::Iterate(config) = &h.workflow.node_by_alias(&"loop".parse().unwrap())
        .unwrap()
        .config
    else {
        panic!("loop is an iterate node");
    };
    assert_eq!(
        config
            .body_positions()
            .unwrap()
            .iter()
            .map(|p| p.get())
            .collect::<Vec<_>>(),
        vec![5, 7]
    );
    assert_eq!(config.body().len(), 2); // symbolic form unchanged

    // Executing the iterate still runs exactly a then b.
    let report = h
        .executor
        .execute(&h.workflow, "seed,loop", false)
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(h.global("ran_a").await, Some(json!(true)));
    assert_eq!(h.global("ran_b").await, Some(json!(true)));
    assert_eq!(h.global("ran_c").await, None);
}

// ── Scenario 6: stop-on-error ──────────────────────────────────────────

#[tokio::test]
async fn first_failure_halts_and_skips_the_rest() {
    let driver = ScriptedDriver::new().with_page(
        "https://app.example.com",
        PageSpec::new("App").with_selectors(["#present"]),
    );

    let h = Harness::new(
        driver,
        ScriptedGenerator::new(),
        json!([
            context_marker("first", "first_ran", json!(true)),
            {
                "alias": "open",
                "type": "browser_action",
                "config": {"action": "navigate", "url": "https://app.example.com"}
            },
            {
                "alias": "broken",
                "type": "browser_action",
                "config": {"action": "click", "selector": "#missing"}
            },
            context_marker("after", "after_ran", json!(true)),
        ]),
    )
    .await;

    let report = h.executor.execute(&h.workflow, "all", false).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    let statuses: Vec<NodeStatus> = report.nodes.iter().map(|n| n.status).collect();
    assert_eq!(
        statuses,
        vec![
            NodeStatus::Success,
            NodeStatus::Success,
            NodeStatus::Error,
            NodeStatus::Skipped
        ]
    );
    let failure = report.nodes[2].error.as_ref().unwrap();
    assert_eq!(failure.code, "selector_failed");

    // Mutations from before the failure persist.
    assert_eq!(h.global("first_ran").await, Some(json!(true)));
    assert_eq!(h.global("after_ran").await, None);
}

// ── Further coverage ───────────────────────────────────────────────────

#[tokio::test]
async fn empty_iteration_succeeds_with_zero_runs() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([
            context_marker("seed", "items", json!([])),
            {
                "alias": "loop",
                "type": "iterate",
                "config": {"over": "{{items}}", "variable": "item", "body": ["mark"]}
            },
            context_marker("mark", "ran", json!(true)),
        ]),
    )
    .await;

    let report = h
        .executor
        .execute(&h.workflow, "seed,loop", false)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report.nodes[1].result,
        Some(json!({"iterations": 0, "failed_iterations": []}))
    );
    assert_eq!(h.global("ran").await, None);
}

#[tokio::test]
async fn single_element_iteration_binds_index_and_total() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([
            context_marker("seed", "items", json!(["only"])),
            {
                "alias": "loop",
                "type": "iterate",
                "config": {"over": "{{items}}", "variable": "item", "body": ["mark"]}
            },
            {
                "alias": "mark",
                "type": "context",
                "config": {"variables": {
                    "index": "{{itemIndex}}",
                    "total": "{{itemTotal}}"
                }}
            }
        ]),
    )
    .await;

    h.executor
        .execute(&h.workflow, "seed,loop", false)
        .await
        .unwrap();

    assert_eq!(h.global("index").await, Some(json!(0)));
    assert_eq!(h.global("total").await, Some(json!(1)));
}

#[tokio::test]
async fn iteration_bindings_do_not_leak_after_completion() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([
            context_marker("seed", "items", json!(["x"])),
            {
                "alias": "loop",
                "type": "iterate",
                "config": {"over": "{{items}}", "variable": "item", "body": ["mark"]}
            },
            context_marker("mark", "inner", json!("{{item}}")),
            context_marker("leak", "outer", json!("{{item}}")),
        ]),
    )
    .await;

    let report = h
        .executor
        .execute(&h.workflow, "seed,loop,leak", false)
        .await
        .unwrap();

    // The binding resolved inside the body but not after the iterate.
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(h.global("inner").await, Some(json!("x")));
    let leak = &report.nodes[2];
    assert_eq!(leak.status, NodeStatus::Error);
    assert_eq!(leak.error.as_ref().unwrap().code, "unresolved_template");
}

#[tokio::test]
async fn on_error_continue_keeps_iterating_and_marks_records_failed() {
    let driver = ScriptedDriver::new().with_ai_extract(
        "Extract rows",
        json!([{"name": "ok"}, {"name": "bad"}, {"name": "ok2"}]),
    );
    let generator = ScriptedGenerator::new().answering("Approve?", json!("yes"));

    let h = Harness::new(
        driver,
        generator,
        json!([
            {
                "alias": "scan",
                "type": "browser_ai_extract",
                "config": {
                    "instruction": "Extract rows",
                    "schema": {"type": "array", "items": {"type": "object"}},
                    "create_records": "row"
                }
            },
            {
                "alias": "each_row",
                "type": "iterate",
                "config": {
                    "over_records": "row_*",
                    "as": "row",
                    "body": ["check"],
                    "on_error": "continue"
                }
            },
            {
                "alias": "check",
                "type": "route",
                "config": [
                    {"name": "bad", "condition": "{{current.scan.name}} === 'bad'", "branch": ["fail_node"]},
                    {"name": "fine", "condition": "true", "branch": ["approve"]}
                ]
            },
            {
                "alias": "fail_node",
                "type": "browser_action",
                "config": {"action": "click", "selector": "#does-not-exist"}
            },
            {
                "alias": "approve",
                "type": "cognition",
                "config": {"instruction": "Approve?", "store_to_record": true, "store": {"result": "verdict"}}
            }
        ]),
    )
    .await;

    let report = h
        .executor
        .execute(&h.workflow, "scan,each_row", false)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        report.nodes[1].result,
        Some(json!({"records": 3, "failed_records": ["row_002"]}))
    );

    let failed = h.store.get_record(h.workflow_id, "row_002").await.unwrap().unwrap();
    assert_eq!(failed.status, RecordStatus::Failed);
    assert!(failed.error_message.is_some());

    for id in ["row_001", "row_003"] {
        let record = h.store.get_record(h.workflow_id, id).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::Completed);
        assert_eq!(record.data["approve"], json!({"verdict": "yes"}));
    }
}

#[tokio::test]
async fn collection_route_partitions_records_by_first_match() {
    let driver = ScriptedDriver::new().with_ai_extract(
        "Extract every email row",
        json!([
            {"subject": "A", "kind": "investor"},
            {"subject": "B", "kind": "other"},
            {"subject": "C", "kind": "investor"}
        ]),
    );

    let h = Harness::new(
        driver,
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "extract",
                "type": "browser_ai_extract",
                "config": {
                    "instruction": "Extract every email row",
                    "schema": {"type": "array", "items": {"type": "object"}},
                    "create_records": "email"
                }
            },
            {
                "alias": "split",
                "type": "route",
                "config": {
                    "mode": "collection",
                    "over": "email_*",
                    "routes": [
                        {"name": "investor", "condition": "{{current.extract.kind}} === 'investor'", "branch": ["note_investors"]},
                        {"name": "other", "condition": "true", "branch": ["note_others"]}
                    ]
                }
            },
            context_marker("note_investors", "investors", json!("{{route.investor}}")),
            context_marker("note_others", "others", json!("{{route.other}}")),
        ]),
    )
    .await;

    let report = h
        .executor
        .execute(&h.workflow, "extract,split", false)
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(
        h.global("investors").await,
        Some(json!(["email_001", "email_003"]))
    );
    assert_eq!(h.global("others").await, Some(json!(["email_002"])));
}

#[tokio::test]
async fn validation_node_fails_on_any_failed_rule() {
    let driver = ScriptedDriver::new()
        .with_page(
            "https://app.example.com",
            PageSpec::new("App").with_selectors(["#banner"]),
        )
        .with_ai_assessment("Did the form submit?", false);

    let h = Harness::new(
        driver,
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "open",
                "type": "browser_action",
                "config": {"action": "navigate", "url": "https://app.example.com"}
            },
            {
                "alias": "verify",
                "type": "validation",
                "config": {"rules": [
                    {"type": "element_exists", "selector": "#banner"},
                    {"type": "ai_assessment", "instruction": "Did the form submit?"}
                ]}
            }
        ]),
    )
    .await;

    let report = h.executor.execute(&h.workflow, "all", false).await.unwrap();

    assert_eq!(report.status, RunStatus::Failed);
    let failure = report.nodes[1].error.as_ref().unwrap();
    assert_eq!(failure.code, "validation_failed");
    assert!(failure.details.is_some());
}

#[tokio::test]
async fn transient_ai_extraction_faults_are_retried() {
    let driver = ScriptedDriver::new()
        .with_ai_extract_outcome(
            "Extract rows",
            Err(AiError::Transport {
                reason: "connection reset".into(),
            }),
        )
        .with_ai_extract("Extract rows", json!(["a"]));

    let h = Harness::new(
        driver,
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "scan",
                "type": "browser_ai_extract",
                "config": {
                    "instruction": "Extract rows",
                    "schema": {"type": "array", "items": {"type": "string"}},
                    "store": true
                }
            }
        ]),
    )
    .await;

    let report = h.executor.execute(&h.workflow, "all", false).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(h.global("scan.result").await, Some(json!(["a"])));
    // Two extraction attempts in the driver log.
    let attempts = h
        .driver
        .log()
        .iter()
        .filter(|entry| entry.starts_with("ai_extract"))
        .count();
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn ai_schema_violation_carries_structured_details() {
    let driver =
        ScriptedDriver::new().with_ai_extract("Extract a number", json!("definitely not"));

    let h = Harness::new(
        driver,
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "n",
                "type": "browser_ai_extract",
                "config": {
                    "instruction": "Extract a number",
                    "schema": {"type": "number"},
                    "store": true
                }
            }
        ]),
    )
    .await;

    let report = h.executor.execute(&h.workflow, "all", false).await.unwrap();

    let failure = report.nodes[0].error.as_ref().unwrap();
    assert_eq!(failure.code, "ai_schema_violation");
    let details = failure.details.as_ref().unwrap();
    assert!(details.get("issues").is_some());
    assert!(details.get("received").is_some());
}

#[tokio::test]
async fn unknown_selection_alias_is_rejected_up_front() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([context_marker("only", "x", json!(1))]),
    )
    .await;

    let err = h
        .executor
        .execute(&h.workflow, "ghost", false)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        webpilot_engine::EngineError::Workflow(
            webpilot_workflow::WorkflowError::AliasNotFound { .. }
        )
    ));
}

#[tokio::test]
async fn cancel_without_running_execution_is_a_noop() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([context_marker("only", "x", json!(1))]),
    )
    .await;
    assert!(!h.executor.cancel());
}

#[tokio::test]
async fn reset_browser_first_closes_auxiliary_tabs() {
    let h = Harness::new(
        ScriptedDriver::new(),
        ScriptedGenerator::new(),
        json!([
            {
                "alias": "aux",
                "type": "browser_action",
                "config": {"action": "open_tab", "name": "scratch"}
            },
            context_marker("noop", "x", json!(1)),
        ]),
    )
    .await;

    h.executor.execute(&h.workflow, "aux", false).await.unwrap();

    let report = h
        .executor
        .execute(&h.workflow, "noop", true)
        .await
        .unwrap();
    assert_eq!(report.status, RunStatus::Completed);

    let state = h
        .store
        .browser_state(h.workflow_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state["tabs"].as_array().unwrap().len(), 1);
    assert_eq!(state["activeTabName"], json!("main"));
}
